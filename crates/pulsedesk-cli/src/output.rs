//! Plain-text and JSON rendering of store state.

use anyhow::Result;
use pulsedesk_core::models::{CreatedPatient, Heartbeat, HeartbeatSummary, Patient, PatientId, PatientStatus};
use pulsedesk_core::Session;
use serde_json::json;

/// Maximum heartbeat rows printed in text mode
const MAX_HEARTBEAT_ROWS: usize = 20;

pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn emit(&self, value: serde_json::Value) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    pub fn message(&self, message: &str) -> Result<()> {
        if self.json {
            return self.emit(json!({ "message": message }));
        }
        println!("{}", message);
        Ok(())
    }

    pub fn session(&self, session: &Session) -> Result<()> {
        if self.json {
            return self.emit(json!({
                "authenticated": session.is_authenticated(),
                "admin": session.user.as_ref().is_some_and(|u| u.is_admin()),
                "user": session.user,
            }));
        }
        match session.user {
            Some(ref user) => {
                println!("Logged in as {}", user.display_name());
                if user.is_admin() {
                    println!("Administrator access");
                }
            }
            None => println!("Logged in"),
        }
        Ok(())
    }

    pub fn patient_list(&self, patients: &[Patient]) -> Result<()> {
        if self.json {
            return self.emit(serde_json::to_value(patients)?);
        }
        if patients.is_empty() {
            println!("No patients");
            return Ok(());
        }
        println!("{:<8} {:<30} {:<8} {:<8}", "ID", "NAME", "GENDER", "AGE");
        for p in patients {
            println!(
                "{:<8} {:<30} {:<8} {:<8}",
                p.id.as_str(),
                truncate(&p.name, 30),
                p.display_gender(),
                p.display_age()
            );
        }
        Ok(())
    }

    pub fn patient(&self, patient: &Patient) -> Result<()> {
        if self.json {
            return self.emit(serde_json::to_value(patient)?);
        }
        println!("Patient #{}", patient.id);
        println!("  Name:       {}", patient.name);
        println!("  Gender:     {}", patient.display_gender());
        println!(
            "  Born:       {} ({})",
            patient.birth_date.as_deref().unwrap_or("-"),
            patient.display_age()
        );
        println!("  Contact:    {}", patient.contact_info.as_deref().unwrap_or("-"));
        println!("  Registered: {}", patient.created_at.as_deref().unwrap_or("-"));
        Ok(())
    }

    pub fn created(&self, created: &CreatedPatient) -> Result<()> {
        if self.json {
            return self.emit(serde_json::to_value(created)?);
        }
        println!("Created patient #{}", created.patient_id);
        Ok(())
    }

    pub fn status(&self, id: &PatientId, status: &PatientStatus) -> Result<()> {
        if self.json {
            return self.emit(serde_json::to_value(status)?);
        }
        println!("Patient #{}: {}", id, status.label());
        for (key, value) in &status.details {
            println!("  {}: {}", key, value);
        }
        Ok(())
    }

    pub fn heartbeats(&self, series: &[Heartbeat]) -> Result<()> {
        if self.json {
            return self.emit(serde_json::to_value(series)?);
        }
        let summary = HeartbeatSummary::from_series(series);
        println!("{} ({} abnormal)", summary.display(), abnormal_percent(&summary));
        let skip = series.len().saturating_sub(MAX_HEARTBEAT_ROWS);
        for hb in series.iter().skip(skip) {
            let rate = hb
                .heart_rate_bpm()
                .map(|bpm| format!("{:.0} bpm", bpm))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<26} {:>8}  {:<6} {}",
                hb.timestamp.as_deref().unwrap_or("-"),
                rate,
                hb.heartbeat_type.as_deref().unwrap_or("-"),
                if hb.is_abnormal() { "ABNORMAL" } else { "" }
            );
        }
        Ok(())
    }

    pub fn overview(
        &self,
        patient: Option<&Patient>,
        status: Option<&PatientStatus>,
        summary: Option<&HeartbeatSummary>,
    ) -> Result<()> {
        if self.json {
            return self.emit(json!({
                "patient": patient,
                "status": status,
                "heartbeats": summary.map(|s| json!({
                    "count": s.count,
                    "abnormal": s.abnormal,
                    "abnormal_ratio": s.abnormal_ratio(),
                    "mean_rate_bpm": s.mean_rate_bpm,
                    "latest_timestamp": s.latest_timestamp,
                })),
            }));
        }
        if let Some(patient) = patient {
            self.patient(patient)?;
        }
        println!("  Status:     {}", status.map(|s| s.label()).unwrap_or("unavailable"));
        match summary {
            Some(summary) => println!(
                "  Heartbeats: {} ({} abnormal)",
                summary.display(),
                abnormal_percent(summary)
            ),
            None => println!("  Heartbeats: unavailable"),
        }
        Ok(())
    }
}

fn abnormal_percent(summary: &HeartbeatSummary) -> String {
    format!("{:.1}%", summary.abnormal_ratio() * 100.0)
}

/// Truncate a string to a maximum length, adding ellipsis if needed
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long patient name", 10), "a very ...");
    }

    #[test]
    fn test_abnormal_percent() {
        let summary = HeartbeatSummary {
            count: 8,
            abnormal: 1,
            mean_rate_bpm: None,
            latest_timestamp: None,
        };
        assert_eq!(abnormal_percent(&summary), "12.5%");
        assert_eq!(abnormal_percent(&HeartbeatSummary::from_series(&[])), "0.0%");
    }
}
