use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ground-truth label for a normal beat
const NORMAL_BEAT_LABEL: &str = "N";

/// Prediction label for a normal beat
const NORMAL_PREDICTION: &str = "Normal";

/// One heartbeat sample with its extracted ECG features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(rename = "pre_RR", alias = "pre_rr", default)]
    pub pre_rr: Option<f64>,
    #[serde(rename = "post_RR", alias = "post_rr", default)]
    pub post_rr: Option<f64>,

    #[serde(default)]
    pub p_peak: Option<f64>,
    #[serde(default)]
    pub t_peak: Option<f64>,
    #[serde(default)]
    pub r_peak: Option<f64>,
    #[serde(default)]
    pub s_peak: Option<f64>,
    #[serde(default)]
    pub q_peak: Option<f64>,

    #[serde(default)]
    pub qrs_interval: Option<f64>,
    #[serde(default)]
    pub pq_interval: Option<f64>,
    #[serde(default)]
    pub qt_interval: Option<f64>,
    #[serde(default)]
    pub st_interval: Option<f64>,

    #[serde(default)]
    pub qrs_morph0: Option<f64>,
    #[serde(default)]
    pub qrs_morph1: Option<f64>,
    #[serde(default)]
    pub qrs_morph2: Option<f64>,
    #[serde(default)]
    pub qrs_morph3: Option<f64>,
    #[serde(default)]
    pub qrs_morph4: Option<f64>,

    /// Dataset label, e.g. "N" or "V"
    #[serde(default)]
    pub heartbeat_type: Option<String>,
    /// Model output, e.g. "Normal" or "Arrhythmic"
    #[serde(default)]
    pub predicted_type: Option<String>,
    #[serde(default)]
    pub prediction_confidence: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Heartbeat {
    /// Instantaneous heart rate derived from the preceding RR interval.
    /// RR intervals are reported in samples at 360 Hz or in seconds; values
    /// above 10 are treated as samples.
    pub fn heart_rate_bpm(&self) -> Option<f64> {
        const SAMPLE_RATE_HZ: f64 = 360.0;
        let rr = self.pre_rr.filter(|rr| *rr > 0.0)?;
        let seconds = if rr > 10.0 { rr / SAMPLE_RATE_HZ } else { rr };
        Some(60.0 / seconds)
    }

    /// True when the prediction (or, lacking one, the ground truth) is not normal
    pub fn is_abnormal(&self) -> bool {
        if let Some(ref predicted) = self.predicted_type {
            return !predicted.eq_ignore_ascii_case(NORMAL_PREDICTION);
        }
        match self.heartbeat_type.as_deref() {
            Some(label) => label != NORMAL_BEAT_LABEL,
            None => false,
        }
    }
}

/// Aggregate view of a heartbeat series for list displays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatSummary {
    pub count: usize,
    pub abnormal: usize,
    pub mean_rate_bpm: Option<f64>,
    pub latest_timestamp: Option<String>,
}

impl HeartbeatSummary {
    pub fn from_series(series: &[Heartbeat]) -> Self {
        let rates: Vec<f64> = series.iter().filter_map(Heartbeat::heart_rate_bpm).collect();
        let mean_rate_bpm = if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum::<f64>() / rates.len() as f64)
        };

        Self {
            count: series.len(),
            abnormal: series.iter().filter(|hb| hb.is_abnormal()).count(),
            mean_rate_bpm,
            latest_timestamp: series.iter().filter_map(|hb| hb.timestamp.clone()).max(),
        }
    }

    pub fn abnormal_ratio(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.abnormal as f64 / self.count as f64
        }
    }

    pub fn display(&self) -> String {
        let rate = match self.mean_rate_bpm {
            Some(bpm) => format!("{:.0} bpm", bpm),
            None => "- bpm".to_string(),
        };
        format!("{} beats, {} abnormal, {}", self.count, self.abnormal, rate)
    }
}
