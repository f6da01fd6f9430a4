//! The bridge itself: four concurrent flows around one spot registry.
//!
//! - cluster reader: parses cluster lines, echoes them, and feeds spots to
//!   the registry, which it alone owns
//! - radio drive loop: runs the radio client until it ends
//! - console input: forwards operator lines to the cluster
//! - interrupt watcher: turns Ctrl+C into a shutdown
//!
//! Shutdown always goes through the radio. The reader, the console and the
//! interrupt watcher end the radio connection; when its drive loop returns
//! the cluster connection is marked closed, and every flow still running
//! stops waiting on its input and exits.

use anyhow::Result;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::cluster::{ClusterConnection, ClusterReader, ClusterWriter};
use crate::console::Console;
use crate::parser::{ClusterLine, parse_line};
use crate::radio::Radio;
use crate::registry::{RegistrySettings, SpotRegistry};
use crate::shutdown::wait_for_flag;
use crate::stats::BridgeStats;

/// Delay between connecting and sending the login callsign.
pub const LOGIN_DELAY: Duration = Duration::from_secs(1);

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub registry: RegistrySettings,

    /// Callsign sent to log in to the cluster.
    pub callsign: Option<String>,

    /// Filter command sent after the callsign.
    pub filter: Option<String>,

    /// Delay between starting the flows and logging in.
    pub login_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            registry: RegistrySettings::default(),
            callsign: None,
            filter: None,
            login_delay: LOGIN_DELAY,
        }
    }
}

/// Coordinator for one cluster session.
pub struct Pipeline<R> {
    radio: Arc<R>,
    console: Arc<Console>,
    stats: Arc<BridgeStats>,
    settings: PipelineSettings,
}

impl<R: Radio> Pipeline<R> {
    pub fn new(radio: Arc<R>, console: Arc<Console>, settings: PipelineSettings) -> Self {
        Self {
            radio,
            console,
            stats: Arc::new(BridgeStats::new()),
            settings,
        }
    }

    pub fn stats(&self) -> Arc<BridgeStats> {
        Arc::clone(&self.stats)
    }

    /// Run all flows until every one of them has finished.
    ///
    /// `input` carries operator lines; `interrupt` completes when the
    /// process should stop.
    pub async fn run<I>(
        self,
        cluster: ClusterConnection,
        input: mpsc::UnboundedReceiver<String>,
        interrupt: I,
    ) -> Result<()>
    where
        I: Future<Output = ()> + Send + 'static,
    {
        let ClusterConnection { reader, writer } = cluster;
        let (cluster_closed, closed) = watch::channel(false);
        let registry = SpotRegistry::new(
            Arc::clone(&self.radio),
            self.settings.registry.clone(),
            Arc::clone(&self.stats),
        );

        let mut flows = JoinSet::new();
        flows.spawn(read_cluster(
            reader,
            registry,
            Arc::clone(&self.console),
            Arc::clone(&self.radio),
            Arc::clone(&self.stats),
            closed.clone(),
        ));
        flows.spawn(drive_radio(Arc::clone(&self.radio), cluster_closed));
        flows.spawn(forward_console(
            input,
            writer.clone(),
            Arc::clone(&self.radio),
            closed.clone(),
        ));
        flows.spawn(watch_interrupt(
            interrupt,
            Arc::clone(&self.radio),
            closed.clone(),
        ));

        let mut login_closed = closed.clone();
        tokio::select! {
            _ = wait_for_flag(&mut login_closed) => {}
            res = login(&writer, &self.settings) => {
                if let Err(e) = res {
                    warn!("Login failed: {}", e);
                }
            }
        }

        while let Some(res) = flows.join_next().await {
            if let Err(e) = res {
                error!("Flow ended abnormally: {}", e);
            }
        }

        if let Err(e) = writer.shutdown().await {
            info!("Cluster connection already gone: {}", e);
        }

        info!("Session summary:\n{}", self.stats.summary());
        Ok(())
    }
}

/// Handle one line from the cluster.
pub async fn process_line<R: Radio>(
    line: &str,
    registry: &mut SpotRegistry<R>,
    console: &Console,
    stats: &BridgeStats,
) {
    match parse_line(line) {
        Ok(ClusterLine::Spot(spot)) => {
            BridgeStats::record(&stats.spots);
            console.print_spot(&spot, registry.is_removal(&spot));
            registry.upsert(&spot).await;
            registry.sweep(Instant::now());
        }
        Ok(ClusterLine::Prompt(prompt)) => console.set_prompt(&prompt),
        Ok(ClusterLine::Text(text)) => {
            BridgeStats::record(&stats.text_lines);
            console.print_line(&text);
        }
        Err(e) => {
            BridgeStats::record(&stats.discarded_lines);
            error!("Discarding '{}': {}", line, e);
        }
    }
}

async fn login(writer: &ClusterWriter, settings: &PipelineSettings) -> io::Result<()> {
    if settings.callsign.is_none() && settings.filter.is_none() {
        return Ok(());
    }

    tokio::time::sleep(settings.login_delay).await;

    if let Some(callsign) = &settings.callsign {
        info!("Logging in as {}", callsign);
        writer.send_line(callsign).await?;
    }
    if let Some(filter) = &settings.filter {
        info!("Sending filter: {}", filter);
        writer.send_line(filter).await?;
    }
    Ok(())
}

async fn read_cluster<R: Radio>(
    mut reader: ClusterReader,
    mut registry: SpotRegistry<R>,
    console: Arc<Console>,
    radio: Arc<R>,
    stats: Arc<BridgeStats>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let line = tokio::select! {
            _ = wait_for_flag(&mut closed) => break,
            line = reader.next_line() => line,
        };

        match line {
            Ok(Some(line)) => process_line(&line, &mut registry, &console, &stats).await,
            Ok(None) => {
                info!("Cluster closed the connection");
                break;
            }
            Err(e) => {
                warn!("Cluster read error: {}", e);
                break;
            }
        }
    }

    radio.close();
}

async fn drive_radio<R: Radio>(radio: Arc<R>, cluster_closed: watch::Sender<bool>) {
    radio.run().await;
    info!("Radio connection ended");
    cluster_closed.send_replace(true);
}

async fn forward_console<R: Radio>(
    mut input: mpsc::UnboundedReceiver<String>,
    writer: ClusterWriter,
    radio: Arc<R>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let line = tokio::select! {
            _ = wait_for_flag(&mut closed) => break,
            line = input.recv() => line,
        };

        match line {
            Some(line) if line.is_empty() => continue,
            Some(line) => {
                if let Err(e) = writer.send_line(&line).await {
                    warn!("Failed to send to cluster: {}", e);
                    break;
                }
            }
            None => {
                info!("Console input closed");
                break;
            }
        }
    }

    radio.close();
}

async fn watch_interrupt<R: Radio, I>(interrupt: I, radio: Arc<R>, mut closed: watch::Receiver<bool>)
where
    I: Future<Output = ()> + Send,
{
    tokio::select! {
        _ = wait_for_flag(&mut closed) => {}
        _ = interrupt => {
            info!("Exit on interrupt");
            radio.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::testing::SharedBuf;
    use crate::radio::mock::MockRadio;
    use crate::registry::SpotKey;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_settings() -> PipelineSettings {
        PipelineSettings {
            login_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    async fn loopback() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_process_line_kinds() {
        let radio = Arc::new(MockRadio::new());
        let stats = Arc::new(BridgeStats::new());
        let mut registry = SpotRegistry::new(
            Arc::clone(&radio),
            RegistrySettings::default(),
            Arc::clone(&stats),
        );
        let buf = SharedBuf::default();
        let console = Console::with_writer(buf.clone(), false);

        process_line("Hello from the cluster", &mut registry, &console, &stats).await;
        process_line("W1AW de GB7DJK >", &mut registry, &console, &stats).await;
        process_line(
            "DX de K1ABC: 14.0.25 W1XYZ CQ 1234Z",
            &mut registry,
            &console,
            &stats,
        )
        .await;
        process_line(
            "DX de K1ABC: 14025.0 W1XYZ CQ 1234Z",
            &mut registry,
            &console,
            &stats,
        )
        .await;

        assert_eq!(console.prompt(), "W1AW de GB7DJK ");
        assert_eq!(radio.commands().len(), 1);
        assert_eq!(registry.len(), 1);

        let output = buf.contents();
        assert!(output.starts_with("Hello from the cluster\n"));
        assert!(output.contains("W1XYZ"));
        assert!(!output.contains("14.0.25"));

        let summary = stats.summary();
        assert_eq!(summary.spots, 1);
        assert_eq!(summary.text_lines, 1);
        assert_eq!(summary.discarded_lines, 1);
    }

    #[tokio::test]
    async fn test_end_to_end_add_update_remove() {
        let radio = Arc::new(MockRadio::new());
        let buf = SharedBuf::default();
        let console = Arc::new(Console::with_writer(buf.clone(), false));
        let settings = PipelineSettings {
            callsign: Some("N0CALL".to_string()),
            ..test_settings()
        };
        let pipeline = Pipeline::new(Arc::clone(&radio), console, settings);
        let stats = pipeline.stats();

        let (client, server) = loopback().await;
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        input_tx.send(String::new()).unwrap();
        input_tx.send("sh/dx".to_string()).unwrap();

        let cluster = tokio::spawn(async move {
            let (read, mut write) = server.into_split();
            write
                .write_all(
                    b"Welcome\r\n\
                      DX de K1ABC: 14025.0 W1XYZ CQ CQ DX 1234Z\r\n\
                      DX de K1ABC: 14030.0 W1XYZ up 2 1236Z\r\n\
                      DX de K1ABC: 14030.0 W1XYZ QRT 1240Z\r\n",
                )
                .await
                .unwrap();

            let mut lines = BufReader::new(read).lines();
            let mut received = Vec::new();
            for _ in 0..2 {
                received.push(lines.next_line().await.unwrap().unwrap());
            }
            received
        });

        tokio::time::timeout(
            WAIT,
            pipeline.run(
                ClusterConnection::from_stream(client),
                input_rx,
                std::future::pending(),
            ),
        )
        .await
        .expect("pipeline ends when the cluster hangs up")
        .unwrap();

        let mut received = cluster.await.unwrap();
        received.sort();
        assert_eq!(received, vec!["N0CALL", "sh/dx"]);

        let commands = radio.commands();
        assert_eq!(commands.len(), 3);
        assert!(commands[0].starts_with("spot add rx_freq=14.025000 callsign=W1XYZ "));
        assert!(commands[1].starts_with("spot set 100 rx_freq=14.030000 callsign=W1XYZ "));
        assert_eq!(commands[2], "spot remove 100");
        assert!(radio.is_closed());

        let output = buf.contents();
        assert!(output.contains("Welcome"));
        assert_eq!(output.matches("W1XYZ").count(), 3);
        assert_eq!(stats.summary().spots, 3);
    }

    #[tokio::test]
    async fn test_radio_exit_stops_everything() {
        let radio = Arc::new(MockRadio::new());
        let console = Arc::new(Console::with_writer(SharedBuf::default(), false));
        let pipeline = Pipeline::new(Arc::clone(&radio), console, test_settings());

        let (client, mut server) = loopback().await;
        let (_input_tx, input_rx) = mpsc::unbounded_channel();

        let run = tokio::spawn(pipeline.run(
            ClusterConnection::from_stream(client),
            input_rx,
            std::future::pending(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!run.is_finished());
        radio.close();

        tokio::time::timeout(WAIT, run)
            .await
            .expect("pipeline ends when the radio does")
            .unwrap()
            .unwrap();

        // Our side of the cluster connection is shut down.
        let mut buf = Vec::new();
        let n = tokio::io::AsyncReadExt::read_to_end(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_console_eof_stops_everything() {
        let radio = Arc::new(MockRadio::new());
        let console = Arc::new(Console::with_writer(SharedBuf::default(), false));
        let pipeline = Pipeline::new(Arc::clone(&radio), console, test_settings());

        let (client, _server) = loopback().await;
        let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();
        drop(input_tx);

        tokio::time::timeout(
            WAIT,
            pipeline.run(
                ClusterConnection::from_stream(client),
                input_rx,
                std::future::pending(),
            ),
        )
        .await
        .expect("pipeline ends when console input ends")
        .unwrap();

        assert!(radio.is_closed());
    }

    #[tokio::test]
    async fn test_interrupt_stops_everything() {
        let radio = Arc::new(MockRadio::new());
        let console = Arc::new(Console::with_writer(SharedBuf::default(), false));
        let pipeline = Pipeline::new(Arc::clone(&radio), console, test_settings());

        let (client, _server) = loopback().await;
        let (_input_tx, input_rx) = mpsc::unbounded_channel();
        let (fire, interrupted) = oneshot::channel::<()>();

        let run = tokio::spawn(pipeline.run(
            ClusterConnection::from_stream(client),
            input_rx,
            async move {
                let _ = interrupted.await;
            },
        ));

        fire.send(()).unwrap();
        tokio::time::timeout(WAIT, run)
            .await
            .expect("pipeline ends on interrupt")
            .unwrap()
            .unwrap();

        assert!(radio.is_closed());
    }

    #[tokio::test]
    async fn test_per_frequency_keys() {
        let radio = Arc::new(MockRadio::new());
        let stats = Arc::new(BridgeStats::new());
        let mut registry = SpotRegistry::new(
            Arc::clone(&radio),
            RegistrySettings {
                one_per_band: false,
                ..Default::default()
            },
            stats.clone(),
        );
        let console = Console::with_writer(SharedBuf::default(), false);

        for line in [
            "DX de K1ABC: 14025.0 W1XYZ CQ 1234Z",
            "DX de K2ABC: 14025.4 W1XYZ CQ 1235Z",
            "DX de K3ABC: 14074.0 W1XYZ FT8 1236Z",
        ] {
            process_line(line, &mut registry, &console, &stats).await;
        }

        let commands = radio.commands();
        assert!(commands[0].starts_with("spot add "));
        assert!(commands[1].starts_with("spot set 100 "));
        assert!(commands[2].starts_with("spot add "));
        assert!(
            registry
                .get(&SpotKey {
                    scope: "14074".to_string(),
                    dx_call: "W1XYZ".to_string()
                })
                .is_some()
        );
    }
}
