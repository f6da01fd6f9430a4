//! Operator console: colorized spot echo, a prompt that follows the
//! cluster's, log output that keeps the prompt intact, and line input from
//! stdin.

use crossterm::style::{StyledContent, Stylize};
use crossterm::{
    cursor::MoveToColumn,
    queue,
    terminal::{Clear, ClearType},
};
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_subscriber::fmt::MakeWriter;

use crate::spot::SpotEvent;

/// Prompt shown until the cluster sends one of its own.
pub const DEFAULT_PROMPT: &str = "cluster";

type Sink = Mutex<Box<dyn Write + Send>>;

/// Console output.
///
/// When attached to a terminal the prompt is kept on the last line: every
/// output line and every log record first clears it and then redraws it
/// underneath.
pub struct Console {
    out: Sink,
    log: Sink,
    prompt: Mutex<String>,
    color: bool,
    interactive: bool,
}

impl Console {
    fn new(
        out: Box<dyn Write + Send>,
        log: Box<dyn Write + Send>,
        color: bool,
        interactive: bool,
    ) -> Self {
        Self {
            out: Mutex::new(out),
            log: Mutex::new(log),
            prompt: Mutex::new(DEFAULT_PROMPT.to_string()),
            color,
            interactive,
        }
    }

    /// Console on stdout with logs on stderr. The prompt is only drawn when
    /// stdout is a terminal.
    pub fn stdout(color: bool) -> Self {
        let interactive = io::stdout().is_terminal();
        Self::new(
            Box::new(io::stdout()),
            Box::new(io::stderr()),
            color && interactive,
            interactive,
        )
    }

    /// Console on an arbitrary writer, without a prompt. Log records are
    /// discarded.
    pub fn with_writer(writer: impl Write + Send + 'static, color: bool) -> Self {
        Self::new(Box::new(writer), Box::new(io::sink()), color, false)
    }

    /// The current prompt text, without its `> ` terminator.
    pub fn prompt(&self) -> String {
        self.lock_prompt().clone()
    }

    /// Replace the prompt with the one the cluster just sent.
    pub fn set_prompt(&self, prompt: &str) {
        *self.lock_prompt() = prompt.to_string();
        debug!("Prompt is now '{}'", prompt);
        self.write_line(None);
    }

    /// Print a line verbatim.
    pub fn print_line(&self, text: &str) {
        self.write_line(Some(text));
    }

    /// Print a spot, marking its comment if it removes the spot.
    pub fn print_spot(&self, spot: &SpotEvent, removing: bool) {
        self.write_line(Some(&format_spot(spot, removing, self.color)));
    }

    fn lock_prompt(&self) -> MutexGuard<'_, String> {
        self.prompt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line(&self, text: Option<&str>) {
        let prompt = self.prompt();
        let res = {
            let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
            self.write_locked(&mut *out, text, &prompt)
        };
        // Logging goes through `out` as well, so only after the lock is gone.
        if let Err(e) = res {
            debug!("Console write failed: {}", e);
        }
    }

    /// Write one formatted log record. Errors are dropped; there is nowhere
    /// left to report them.
    fn write_log(&self, record: &[u8]) {
        let prompt = self.prompt();
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self.write_log_locked(&mut *out, &mut *log, record, &prompt);
    }

    fn write_locked<W: Write>(&self, out: &mut W, text: Option<&str>, prompt: &str) -> io::Result<()> {
        self.clear_prompt(out)?;
        if let Some(text) = text {
            writeln!(out, "{}", text)?;
        }
        self.redraw_prompt(out, prompt)
    }

    fn write_log_locked<W: Write, L: Write>(
        &self,
        out: &mut W,
        log: &mut L,
        record: &[u8],
        prompt: &str,
    ) -> io::Result<()> {
        self.clear_prompt(out)?;
        out.flush()?;
        log.write_all(record)?;
        log.flush()?;
        self.redraw_prompt(out, prompt)
    }

    fn clear_prompt<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.interactive {
            queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        }
        Ok(())
    }

    fn redraw_prompt<W: Write>(&self, out: &mut W, prompt: &str) -> io::Result<()> {
        if self.interactive {
            write!(out, "{}> ", paint(prompt.magenta(), self.color))?;
        }
        out.flush()
    }
}

/// [`MakeWriter`] for `tracing_subscriber` that writes each log record
/// through the console, so records do not land in the middle of the prompt.
#[derive(Clone)]
pub struct ConsoleLog {
    console: Arc<Console>,
}

impl ConsoleLog {
    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }
}

impl<'a> MakeWriter<'a> for ConsoleLog {
    type Writer = LogRecord;

    fn make_writer(&'a self) -> Self::Writer {
        LogRecord {
            console: Arc::clone(&self.console),
            buf: Vec::with_capacity(128),
        }
    }
}

/// One log record, buffered and handed to the console when dropped.
pub struct LogRecord {
    console: Arc<Console>,
    buf: Vec<u8>,
}

impl Write for LogRecord {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogRecord {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            self.console.write_log(&self.buf);
        }
    }
}

fn paint(styled: StyledContent<&str>, color: bool) -> String {
    if color {
        styled.to_string()
    } else {
        styled.content().to_string()
    }
}

/// Format a spot for the console, followed by its band.
pub fn format_spot(spot: &SpotEvent, removing: bool, color: bool) -> String {
    // Pad before painting; escape codes would throw off the widths.
    let frequency = format!("{:>8.1}", spot.frequency_khz);
    let dx_call = format!("{:<12}", spot.dx_call);
    let comment = format!("{:<30}", spot.comment);
    let comment = if removing {
        comment.as_str().red()
    } else {
        comment.as_str().cyan()
    };

    format!(
        "{} {}: {} {} {} {} {}",
        paint("DX de".green(), color),
        paint(spot.spotter.as_str().yellow(), color),
        paint(frequency.as_str().blue(), color),
        paint(dx_call.as_str().dark_magenta(), color),
        paint(comment, color),
        spot.timestamp,
        paint(spot.band().green(), color),
    )
}

/// Read operator lines from stdin on a dedicated thread.
///
/// Blocking stdin reads cannot be cancelled, so they stay off the runtime.
/// The channel closes when stdin reaches end of stream or fails.
pub fn spawn_stdin_reader() -> io::Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();

    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || forward_lines(io::stdin().lock(), &tx))?;

    Ok(rx)
}

/// Send each line of `reader` to `tx`, without its line ending, until end of
/// stream, a read error, or the receiver going away. Bytes that are not
/// valid UTF-8 are replaced.
fn forward_lines(mut reader: impl BufRead, tx: &mpsc::UnboundedSender<String>) {
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Console read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Console output capture for tests.

    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
