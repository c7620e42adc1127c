use std::collections::BTreeMap;
use std::path::Path;

use crate::analysis::{AnalyzerError, ExtruderAnalysis, FileAnalysis, FileAnalyzer};

const KEY_PRINT_TIME: &str = "PRINT.TIME";
const DEFAULT_FILAMENT_DIAMETER_MM: f64 = 2.85;
const DEFAULT_FILAMENT_DENSITY_G_CM3: f64 = 1.24;

/// Only the leading comment block is inspected; a sliced file's body can be
/// hundreds of megabytes.
const HEADER_LIMIT_BYTES: usize = 64 * 1024;

/// Analyzer for the slicer header block: leading `;KEY:VALUE` comment lines
/// describing print time and per-train material data, e.g.
///
/// ```text
/// ;PRINT.TIME:5230
/// ;EXTRUDER_TRAIN.0.MATERIAL.TYPE:PLA
/// ;EXTRUDER_TRAIN.0.NOZZLE.DIAMETER:0.4
/// ;EXTRUDER_TRAIN.0.MATERIAL.USED:4320.5
/// ```
#[derive(Debug, Clone, Default)]
pub struct GcodeHeaderAnalyzer;

impl GcodeHeaderAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Parse an already-loaded header text. Split out for tests.
    pub fn parse_header(text: &str) -> Result<FileAnalysis, AnalyzerError> {
        let header = read_header_block(text);

        let print_seconds = match header.get(KEY_PRINT_TIME) {
            Some(raw) => parse_f64(KEY_PRINT_TIME, raw)?,
            None => {
                return Err(AnalyzerError::MissingFileDataKeys {
                    keys: vec![KEY_PRINT_TIME.to_string()],
                });
            }
        };
        if print_seconds < 0.0 {
            return Err(AnalyzerError::InvalidFileData(format!(
                "{KEY_PRINT_TIME} must be non-negative, got {print_seconds}"
            )));
        }

        let mut extruders = Vec::new();
        for (index, keys) in train_keys(&header) {
            let material_type = keys.get("MATERIAL.TYPE").map(|v| v.to_string());
            let nozzle_diameter = keys
                .get("NOZZLE.DIAMETER")
                .map(|v| parse_f64(&train_key(index, "NOZZLE.DIAMETER"), v))
                .transpose()?;
            let filament_distance_mm = keys
                .get("MATERIAL.USED")
                .map(|v| parse_f64(&train_key(index, "MATERIAL.USED"), v))
                .transpose()?;
            let filament_diameter_mm = keys
                .get("MATERIAL.DIAMETER")
                .map(|v| parse_f64(&train_key(index, "MATERIAL.DIAMETER"), v))
                .transpose()?
                .unwrap_or(DEFAULT_FILAMENT_DIAMETER_MM);
            let filament_density_g_cm3 = keys
                .get("MATERIAL.DENSITY")
                .map(|v| parse_f64(&train_key(index, "MATERIAL.DENSITY"), v))
                .transpose()?
                .unwrap_or(DEFAULT_FILAMENT_DENSITY_G_CM3);

            extruders.push(ExtruderAnalysis {
                index,
                enabled: true,
                material_type,
                nozzle_diameter,
                filament_distance_mm,
                filament_diameter_mm,
                filament_density_g_cm3,
            });
        }

        if extruders.is_empty() {
            return Err(AnalyzerError::MissingFileDataKeys {
                keys: vec![train_key(0, "MATERIAL.TYPE")],
            });
        }

        Ok(FileAnalysis {
            print_seconds,
            extruders,
        })
    }
}

#[async_trait::async_trait]
impl FileAnalyzer for GcodeHeaderAnalyzer {
    async fn analyze(&self, path: &Path) -> Result<FileAnalysis, AnalyzerError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalyzerError::InvalidFileData(format!("unreadable file: {e}")))?;
        let head = &bytes[..bytes.len().min(HEADER_LIMIT_BYTES)];
        let text = String::from_utf8_lossy(head);
        Self::parse_header(&text)
    }
}

fn train_key(index: u32, suffix: &str) -> String {
    format!("EXTRUDER_TRAIN.{index}.{suffix}")
}

/// Collect `;KEY:VALUE` lines until the first non-comment line.
fn read_header_block(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(comment) = line.strip_prefix(';') else {
            break;
        };
        if let Some((key, value)) = comment.split_once(':') {
            out.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    out
}

/// Group header keys by extruder train index: `EXTRUDER_TRAIN.<i>.<rest>`.
fn train_keys(header: &BTreeMap<String, String>) -> BTreeMap<u32, BTreeMap<String, String>> {
    let mut out: BTreeMap<u32, BTreeMap<String, String>> = BTreeMap::new();
    for (key, value) in header {
        let Some(rest) = key.strip_prefix("EXTRUDER_TRAIN.") else {
            continue;
        };
        let Some((idx, suffix)) = rest.split_once('.') else {
            continue;
        };
        let Ok(index) = idx.parse::<u32>() else {
            continue;
        };
        out.entry(index)
            .or_default()
            .insert(suffix.to_string(), value.clone());
    }
    out
}

fn parse_f64(key: &str, raw: &str) -> Result<f64, AnalyzerError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AnalyzerError::InvalidFileData(format!("{key}: not a number: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUAL_HEADER: &str = "\
;PRINT.TIME:5230
;EXTRUDER_TRAIN.0.MATERIAL.TYPE:PLA
;EXTRUDER_TRAIN.0.NOZZLE.DIAMETER:0.6
;EXTRUDER_TRAIN.0.MATERIAL.USED:4320.5
;EXTRUDER_TRAIN.1.MATERIAL.TYPE:ABS
;EXTRUDER_TRAIN.1.NOZZLE.DIAMETER:0.4
;EXTRUDER_TRAIN.1.MATERIAL.USED:812.0
;EXTRUDER_TRAIN.1.MATERIAL.DENSITY:1.04
G28
G1 X10 Y10
";

    #[test]
    fn parses_dual_extruder_header() {
        let analysis = GcodeHeaderAnalyzer::parse_header(DUAL_HEADER).unwrap();
        assert_eq!(analysis.print_seconds, 5230.0);
        assert_eq!(analysis.extruders.len(), 2);

        let e0 = &analysis.extruders[0];
        assert_eq!(e0.index, 0);
        assert_eq!(e0.material_type.as_deref(), Some("PLA"));
        assert_eq!(e0.nozzle_diameter, Some(0.6));
        assert_eq!(e0.filament_distance_mm, Some(4320.5));
        assert_eq!(e0.filament_density_g_cm3, 1.24);

        let e1 = &analysis.extruders[1];
        assert_eq!(e1.material_type.as_deref(), Some("ABS"));
        assert_eq!(e1.filament_density_g_cm3, 1.04);

        assert!(analysis.total_mass_g() > 0.0);
    }

    #[test]
    fn missing_print_time_reports_key() {
        let err = GcodeHeaderAnalyzer::parse_header(
            ";EXTRUDER_TRAIN.0.MATERIAL.TYPE:PLA\nG28\n",
        )
        .unwrap_err();
        assert_eq!(
            err,
            AnalyzerError::MissingFileDataKeys {
                keys: vec!["PRINT.TIME".to_string()]
            }
        );
    }

    #[test]
    fn missing_trains_reports_key() {
        let err = GcodeHeaderAnalyzer::parse_header(";PRINT.TIME:10\nG28\n").unwrap_err();
        assert!(matches!(err, AnalyzerError::MissingFileDataKeys { .. }));
    }

    #[test]
    fn garbage_number_is_invalid_data() {
        let err = GcodeHeaderAnalyzer::parse_header(
            ";PRINT.TIME:soon\n;EXTRUDER_TRAIN.0.MATERIAL.TYPE:PLA\n",
        )
        .unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidFileData(_)));
    }

    #[test]
    fn header_stops_at_first_gcode_line() {
        // Keys after the body must not be picked up.
        let text = ";PRINT.TIME:10\n;EXTRUDER_TRAIN.0.MATERIAL.TYPE:PLA\nG28\n;EXTRUDER_TRAIN.5.MATERIAL.TYPE:TPU\n";
        let analysis = GcodeHeaderAnalyzer::parse_header(text).unwrap();
        assert_eq!(analysis.extruders.len(), 1);
        assert_eq!(analysis.extruders[0].index, 0);
    }

    #[test]
    fn negative_print_time_rejected() {
        let err = GcodeHeaderAnalyzer::parse_header(
            ";PRINT.TIME:-5\n;EXTRUDER_TRAIN.0.MATERIAL.TYPE:PLA\n",
        )
        .unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidFileData(_)));
    }
}
