use std::collections::BTreeSet;

use uuid::Uuid;

/// Allowed configuration of a job, as produced by file analysis. Both lists
/// hold `(extruder_index, catalog_id)` pairs; an empty list at an index
/// means the job places no constraint of that kind there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRequirements {
    pub allowed_materials: Vec<(u32, i32)>,
    pub allowed_extruder_types: Vec<(u32, i32)>,
}

impl JobRequirements {
    /// Extruder indices the job addresses at all.
    pub fn declared_indices(&self) -> BTreeSet<u32> {
        self.allowed_materials
            .iter()
            .chain(self.allowed_extruder_types.iter())
            .map(|(idx, _)| *idx)
            .collect()
    }

    fn materials_at(&self, index: u32) -> impl Iterator<Item = i32> + '_ {
        self.allowed_materials
            .iter()
            .filter(move |(idx, _)| *idx == index)
            .map(|(_, id)| *id)
    }

    fn extruder_types_at(&self, index: u32) -> impl Iterator<Item = i32> + '_ {
        self.allowed_extruder_types
            .iter()
            .filter(move |(idx, _)| *idx == index)
            .map(|(_, id)| *id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtruderSnapshot {
    pub extruder_type_id: Option<i32>,
    pub material_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterSnapshot {
    pub id: Uuid,
    pub operational: bool,
    pub extruders: Vec<ExtruderSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feasibility {
    pub can_be_printed: bool,
    pub usable: Vec<Uuid>,
}

/// Whether a single printer can currently run the job: it must be
/// operational, have an extruder at every declared index, and every declared
/// constraint at that index must match what is loaded right now.
pub fn printer_is_usable(req: &JobRequirements, printer: &PrinterSnapshot) -> bool {
    if !printer.operational {
        return false;
    }
    for index in req.declared_indices() {
        let Some(slot) = printer.extruders.get(index as usize) else {
            return false;
        };

        let mut materials = req.materials_at(index).peekable();
        if materials.peek().is_some() {
            let Some(loaded) = slot.material_id else {
                return false;
            };
            if !materials.any(|m| m == loaded) {
                return false;
            }
        }

        let mut types = req.extruder_types_at(index).peekable();
        if types.peek().is_some() {
            let Some(mounted) = slot.extruder_type_id else {
                return false;
            };
            if !types.any(|t| t == mounted) {
                return false;
            }
        }
    }
    true
}

/// The `canBePrinted` predicate: the disjunction over operational printers
/// of the per-printer feasibility check, plus the list of usable printers in
/// the order they were given.
pub fn evaluate(req: &JobRequirements, printers: &[PrinterSnapshot]) -> Feasibility {
    let usable: Vec<Uuid> = printers
        .iter()
        .filter(|p| printer_is_usable(req, p))
        .map(|p| p.id)
        .collect();
    Feasibility {
        can_be_printed: !usable.is_empty(),
        usable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLA: i32 = 1;
    const ABS: i32 = 2;
    const NOZZLE_06: i32 = 10;
    const NOZZLE_04: i32 = 11;

    fn printer(operational: bool, extruders: Vec<ExtruderSnapshot>) -> PrinterSnapshot {
        PrinterSnapshot {
            id: Uuid::new_v4(),
            operational,
            extruders,
        }
    }

    fn dual_pla_abs() -> PrinterSnapshot {
        printer(
            true,
            vec![
                ExtruderSnapshot {
                    extruder_type_id: Some(NOZZLE_06),
                    material_id: Some(PLA),
                },
                ExtruderSnapshot {
                    extruder_type_id: Some(NOZZLE_04),
                    material_id: Some(ABS),
                },
            ],
        )
    }

    #[test]
    fn matching_dual_extruder_job_is_feasible() {
        // Seed from the gating scenario: printer [PLA/0.6, ABS/0.4], job
        // allows {(PLA,0),(ABS,1)} and nozzles {(0.6,0),(0.4,1)}.
        let req = JobRequirements {
            allowed_materials: vec![(0, PLA), (1, ABS)],
            allowed_extruder_types: vec![(0, NOZZLE_06), (1, NOZZLE_04)],
        };
        let p = dual_pla_abs();
        let result = evaluate(&req, &[p.clone()]);
        assert!(result.can_be_printed);
        assert_eq!(result.usable, vec![p.id]);
    }

    #[test]
    fn wrong_material_at_index_blocks_printer() {
        let req = JobRequirements {
            allowed_materials: vec![(0, ABS)],
            allowed_extruder_types: vec![],
        };
        let result = evaluate(&req, &[dual_pla_abs()]);
        assert!(!result.can_be_printed);
        assert!(result.usable.is_empty());
    }

    #[test]
    fn undeclared_index_is_unconstrained() {
        // Job only cares about extruder 1; whatever is loaded at 0 is fine.
        let req = JobRequirements {
            allowed_materials: vec![(1, ABS)],
            allowed_extruder_types: vec![],
        };
        assert!(evaluate(&req, &[dual_pla_abs()]).can_be_printed);
    }

    #[test]
    fn too_few_extruders_blocks_printer() {
        let req = JobRequirements {
            allowed_materials: vec![(1, PLA)],
            allowed_extruder_types: vec![],
        };
        let single = printer(
            true,
            vec![ExtruderSnapshot {
                extruder_type_id: Some(NOZZLE_04),
                material_id: Some(PLA),
            }],
        );
        assert!(!evaluate(&req, &[single]).can_be_printed);
    }

    #[test]
    fn non_operational_printer_never_usable() {
        let req = JobRequirements {
            allowed_materials: vec![(0, PLA)],
            allowed_extruder_types: vec![],
        };
        let mut p = dual_pla_abs();
        p.operational = false;
        assert!(!evaluate(&req, &[p]).can_be_printed);
    }

    #[test]
    fn empty_slot_fails_declared_constraint() {
        let req = JobRequirements {
            allowed_materials: vec![(0, PLA)],
            allowed_extruder_types: vec![],
        };
        let p = printer(
            true,
            vec![ExtruderSnapshot {
                extruder_type_id: Some(NOZZLE_06),
                material_id: None,
            }],
        );
        assert!(!evaluate(&req, &[p]).can_be_printed);
    }

    #[test]
    fn multiple_allowed_materials_at_same_index() {
        let req = JobRequirements {
            allowed_materials: vec![(0, PLA), (0, ABS)],
            allowed_extruder_types: vec![],
        };
        assert!(evaluate(&req, &[dual_pla_abs()]).can_be_printed);
    }

    #[test]
    fn usable_list_spans_printers() {
        let req = JobRequirements {
            allowed_materials: vec![(0, PLA)],
            allowed_extruder_types: vec![],
        };
        let a = dual_pla_abs();
        let b = printer(
            true,
            vec![ExtruderSnapshot {
                extruder_type_id: Some(NOZZLE_04),
                material_id: Some(ABS),
            }],
        );
        let c = dual_pla_abs();
        let result = evaluate(&req, &[a.clone(), b, c.clone()]);
        assert_eq!(result.usable, vec![a.id, c.id]);
    }

    #[test]
    fn unconstrained_job_runs_anywhere_operational() {
        let req = JobRequirements::default();
        let p = printer(true, vec![]);
        assert!(evaluate(&req, &[p]).can_be_printed);
        let off = printer(false, vec![]);
        assert!(!evaluate(&req, &[off]).can_be_printed);
    }
}
