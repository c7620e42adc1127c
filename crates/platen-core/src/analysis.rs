use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyzerError {
    #[error("file data is missing required keys: {}", keys.join(", "))]
    MissingFileDataKeys { keys: Vec<String> },
    #[error("invalid file data: {0}")]
    InvalidFileData(String),
}

/// Per-extruder outcome of analyzing a sliced file. `material_type` and
/// `nozzle_diameter` constrain which extruder positions can run the job;
/// the filament figures feed the mass estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtruderAnalysis {
    pub index: u32,
    pub enabled: bool,
    pub material_type: Option<String>,
    pub nozzle_diameter: Option<f64>,
    pub filament_distance_mm: Option<f64>,
    pub filament_diameter_mm: f64,
    pub filament_density_g_cm3: f64,
}

impl ExtruderAnalysis {
    /// Estimated filament mass in grams: `mass = pi * (d/2)^2 * rho * L`.
    pub fn estimated_mass_g(&self) -> Option<f64> {
        let distance_mm = self.filament_distance_mm?;
        Some(filament_mass_g(
            self.filament_diameter_mm,
            self.filament_density_g_cm3,
            distance_mm,
        ))
    }
}

/// `diameter_mm` and `distance_mm` in millimetres, `density_g_cm3` in g/cm3.
pub fn filament_mass_g(diameter_mm: f64, density_g_cm3: f64, distance_mm: f64) -> f64 {
    let radius_cm = diameter_mm / 2.0 / 10.0;
    let distance_cm = distance_mm / 10.0;
    std::f64::consts::PI * radius_cm * radius_cm * density_g_cm3 * distance_cm
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Estimated print duration in seconds.
    pub print_seconds: f64,
    pub extruders: Vec<ExtruderAnalysis>,
}

impl FileAnalysis {
    pub fn enabled_extruders(&self) -> impl Iterator<Item = &ExtruderAnalysis> {
        self.extruders.iter().filter(|e| e.enabled)
    }

    /// Total estimated filament mass over all enabled extruders, grams.
    pub fn total_mass_g(&self) -> f64 {
        self.enabled_extruders()
            .filter_map(ExtruderAnalysis::estimated_mass_g)
            .sum()
    }
}

/// Contract for turning an uploaded file into its resource requirements.
/// The default implementation reads slicer header comments; tests swap in
/// canned analyzers.
#[async_trait::async_trait]
pub trait FileAnalyzer: Send + Sync {
    async fn analyze(&self, path: &Path) -> Result<FileAnalysis, AnalyzerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_formula_matches_hand_computation() {
        // 2.85 mm filament, PLA-ish density 1.24 g/cm3, 1 m of filament.
        let mass = filament_mass_g(2.85, 1.24, 1000.0);
        // pi * (0.1425 cm)^2 * 1.24 g/cm3 * 100 cm
        let expected = std::f64::consts::PI * 0.1425 * 0.1425 * 1.24 * 100.0;
        assert!((mass - expected).abs() < 1e-9);
        assert!((mass - 7.91).abs() < 0.01);
    }

    #[test]
    fn extruder_without_distance_has_no_mass() {
        let e = ExtruderAnalysis {
            index: 0,
            enabled: true,
            material_type: Some("PLA".to_string()),
            nozzle_diameter: Some(0.4),
            filament_distance_mm: None,
            filament_diameter_mm: 2.85,
            filament_density_g_cm3: 1.24,
        };
        assert_eq!(e.estimated_mass_g(), None);
    }

    #[test]
    fn total_mass_sums_enabled_only() {
        let analysis = FileAnalysis {
            print_seconds: 60.0,
            extruders: vec![
                ExtruderAnalysis {
                    index: 0,
                    enabled: true,
                    material_type: Some("PLA".to_string()),
                    nozzle_diameter: Some(0.4),
                    filament_distance_mm: Some(1000.0),
                    filament_diameter_mm: 2.85,
                    filament_density_g_cm3: 1.24,
                },
                ExtruderAnalysis {
                    index: 1,
                    enabled: false,
                    material_type: None,
                    nozzle_diameter: None,
                    filament_distance_mm: Some(9999.0),
                    filament_diameter_mm: 2.85,
                    filament_density_g_cm3: 1.24,
                },
            ],
        };
        let total = analysis.total_mass_g();
        let only_first = analysis.extruders[0].estimated_mass_g().unwrap();
        assert!((total - only_first).abs() < 1e-12);
    }
}
