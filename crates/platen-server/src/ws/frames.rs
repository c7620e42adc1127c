use platen_core::states::PrinterState;
use serde::Deserialize;
use uuid::Uuid;

/// Inbound frames are JSON objects keyed by event name plus the echoed
/// session key: `{"key": "...", "print_started": {"job_id": "..."}}`.
/// Serde's external enum tagging gives the event-name keying; the wrapper
/// flattens around it.
#[derive(Debug, Deserialize)]
pub struct PrinterFrame {
    pub key: Uuid,
    #[serde(flatten)]
    pub event: PrinterInbound,
}

#[derive(Debug, Deserialize)]
pub enum PrinterInbound {
    #[serde(rename = "initial_data")]
    InitialData(InitialData),
    #[serde(rename = "state_updated")]
    StateUpdated { state: PrinterState },
    #[serde(rename = "extruders_updated")]
    ExtrudersUpdated { extruders_info: Vec<ExtruderInfo> },
    #[serde(rename = "print_started")]
    PrintStarted { job_id: Uuid },
    #[serde(rename = "print_finished")]
    PrintFinished { job_id: Uuid, cancelled: bool },
    #[serde(rename = "print_feedback")]
    PrintFeedback { job_id: Uuid, feedback: Feedback },
    #[serde(rename = "printer_temperatures_updated")]
    TemperaturesUpdated {
        bed_temp: f64,
        extruders_temp: Vec<f64>,
    },
    #[serde(rename = "job_progress_updated")]
    JobProgressUpdated {
        id: Uuid,
        progress: f64,
        #[serde(default)]
        estimated_seconds_left: Option<f64>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitialData {
    pub state: PrinterState,
    pub extruders_info: Vec<ExtruderInfo>,
}

/// What a printer reports as loaded at one extruder position. Values are
/// resolved against the catalogs; anything unresolvable leaves the slot
/// unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtruderInfo {
    pub index: u32,
    #[serde(default)]
    pub material_type: Option<String>,
    #[serde(default)]
    pub material_guid: Option<String>,
    #[serde(default)]
    pub nozzle_diameter: Option<f64>,
}

/// Terminal report for a print. `max_priority` only matters for a failed
/// print that should be retried: `true` puts it at the head of the queue,
/// `false` at the tail, absent means no retry.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Feedback {
    pub success: bool,
    #[serde(default)]
    pub max_priority: Option<bool>,
    pub printing_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub key: Uuid,
    #[serde(flatten)]
    pub event: ClientInbound,
}

#[derive(Debug, Deserialize)]
pub enum ClientInbound {
    #[serde(rename = "analyze_job")]
    AnalyzeJob { job_id: Uuid },
    #[serde(rename = "enqueue_job")]
    EnqueueJob { job_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn print_started_frame_decodes() {
        let k = key();
        let job = Uuid::new_v4();
        let raw = format!(r#"{{"key":"{k}","print_started":{{"job_id":"{job}"}}}}"#);
        let frame: PrinterFrame = serde_json::from_str(&raw).unwrap();
        assert_eq!(frame.key, k);
        match frame.event {
            PrinterInbound::PrintStarted { job_id } => assert_eq!(job_id, job),
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn feedback_frame_decodes_with_optional_max_priority() {
        let k = key();
        let job = Uuid::new_v4();
        let raw = format!(
            r#"{{"key":"{k}","print_feedback":{{"job_id":"{job}","feedback":{{"success":false,"max_priority":false,"printing_seconds":112.1}}}}}}"#
        );
        let frame: PrinterFrame = serde_json::from_str(&raw).unwrap();
        match frame.event {
            PrinterInbound::PrintFeedback { feedback, .. } => {
                assert!(!feedback.success);
                assert_eq!(feedback.max_priority, Some(false));
                assert_eq!(feedback.printing_seconds, 112.1);
            }
            other => panic!("wrong event: {other:?}"),
        }

        let raw = format!(
            r#"{{"key":"{k}","print_feedback":{{"job_id":"{job}","feedback":{{"success":true,"printing_seconds":60.0}}}}}}"#
        );
        let frame: PrinterFrame = serde_json::from_str(&raw).unwrap();
        match frame.event {
            PrinterInbound::PrintFeedback { feedback, .. } => {
                assert!(feedback.success);
                assert_eq!(feedback.max_priority, None);
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn initial_data_frame_decodes() {
        let k = key();
        let raw = format!(
            r#"{{"key":"{k}","initial_data":{{"state":"Ready","extruders_info":[
                {{"index":0,"material_type":"PLA","nozzle_diameter":0.6}},
                {{"index":1,"material_type":"ABS","nozzle_diameter":0.4}}
            ]}}}}"#
        );
        let frame: PrinterFrame = serde_json::from_str(&raw).unwrap();
        match frame.event {
            PrinterInbound::InitialData(data) => {
                assert_eq!(data.state, PrinterState::Ready);
                assert_eq!(data.extruders_info.len(), 2);
                assert_eq!(data.extruders_info[0].material_type.as_deref(), Some("PLA"));
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn print_finished_state_name_with_space_decodes() {
        let k = key();
        let raw = format!(r#"{{"key":"{k}","state_updated":{{"state":"Print finished"}}}}"#);
        let frame: PrinterFrame = serde_json::from_str(&raw).unwrap();
        match frame.event {
            PrinterInbound::StateUpdated { state } => {
                assert_eq!(state, PrinterState::PrintFinished);
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let k = key();
        let raw = format!(r#"{{"key":"{k}","set_on_fire":{{}}}}"#);
        assert!(serde_json::from_str::<PrinterFrame>(&raw).is_err());
    }

    #[test]
    fn unknown_payload_field_is_rejected() {
        let k = key();
        let job = Uuid::new_v4();
        let raw = format!(
            r#"{{"key":"{k}","print_feedback":{{"job_id":"{job}","feedback":{{"success":true,"printing_seconds":1.0,"surprise":true}}}}}}"#
        );
        assert!(serde_json::from_str::<PrinterFrame>(&raw).is_err());
    }

    #[test]
    fn missing_key_is_rejected() {
        let job = Uuid::new_v4();
        let raw = format!(r#"{{"print_started":{{"job_id":"{job}"}}}}"#);
        assert!(serde_json::from_str::<PrinterFrame>(&raw).is_err());
    }

    #[test]
    fn client_frames_decode() {
        let k = key();
        let job = Uuid::new_v4();
        let raw = format!(r#"{{"key":"{k}","enqueue_job":{{"job_id":"{job}"}}}}"#);
        let frame: ClientFrame = serde_json::from_str(&raw).unwrap();
        match frame.event {
            ClientInbound::EnqueueJob { job_id } => assert_eq!(job_id, job),
            other => panic!("wrong event: {other:?}"),
        }
    }
}
