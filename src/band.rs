//! Amateur band classification.
//!
//! Bands are described by their lower edge only, so every frequency maps to
//! some label: anything below 160m is `LFMF` and anything above 2.3 GHz is
//! `microwave`.

/// Lower band edges in kHz, ascending.
pub const BAND_EDGES: &[(f64, &str)] = &[
    (0.0, "LFMF"),
    (1800.0, "160m"),
    (3500.0, "80m"),
    (5000.0, "60m"),
    (7000.0, "40m"),
    (10000.0, "30m"),
    (14000.0, "20m"),
    (18000.0, "17m"),
    (21000.0, "15m"),
    (24890.0, "12m"),
    (26000.0, "11m"),
    (28000.0, "10m"),
    (50000.0, "6m"),
    (144000.0, "2m"),
    (220000.0, "125cm"),
    (420000.0, "70cm"),
    (900000.0, "900M"),
    (1240000.0, "1240M"),
    (2300000.0, "microwave"),
];

/// Returns the label of the band whose lower edge is the greatest one not
/// above `freq_khz`.
///
/// # Example
///
/// ```
/// use cluster_spots::band::classify;
///
/// assert_eq!(classify(14025.0), "20m");
/// assert_eq!(classify(0.0), "LFMF");
/// ```
pub fn classify(freq_khz: f64) -> &'static str {
    BAND_EDGES
        .iter()
        .rev()
        .find(|(min_khz, _)| freq_khz >= *min_khz)
        .map(|(_, name)| *name)
        .unwrap_or(BAND_EDGES[0].1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_common_bands() {
        assert_eq!(classify(1820.0), "160m");
        assert_eq!(classify(3525.0), "80m");
        assert_eq!(classify(7030.0), "40m");
        assert_eq!(classify(14025.0), "20m");
        assert_eq!(classify(21025.0), "15m");
        assert_eq!(classify(28025.0), "10m");
        assert_eq!(classify(144174.0), "2m");
    }

    #[test]
    fn test_every_edge_and_just_below() {
        for pair in BAND_EDGES.windows(2) {
            let (lower_edge, lower_name) = pair[0];
            let (edge, name) = pair[1];
            assert_eq!(classify(edge), name, "at edge {}", edge);
            assert_eq!(classify(edge - 0.001), lower_name, "just below {}", edge);
            assert_eq!(classify(lower_edge), lower_name);
        }
    }

    #[test]
    fn test_below_first_edge() {
        assert_eq!(classify(0.0), "LFMF");
        assert_eq!(classify(137.0), "LFMF");
        assert_eq!(classify(-5.0), "LFMF");
    }

    #[test]
    fn test_above_last_edge() {
        assert_eq!(classify(10_368_100.0), "microwave");
    }

    #[test]
    fn test_edges_ascending() {
        assert!(BAND_EDGES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    proptest! {
        #[test]
        fn prop_greatest_edge_not_above(freq in 0.0f64..3_000_000.0) {
            let expected = BAND_EDGES
                .iter()
                .filter(|(min_khz, _)| *min_khz <= freq)
                .max_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, name)| *name)
                .unwrap();
            prop_assert_eq!(classify(freq), expected);
        }
    }
}
