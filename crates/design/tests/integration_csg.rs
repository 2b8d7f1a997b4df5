//! Integration tests for the CSG engine.
//!
//! Tests touching-set partitioning, node-level subtraction and the export
//! merge against the manifold kernel.

use std::time::Duration;

use design_scene_lib::csg::{
    combine_participants, do_subtract, group_by_touching, merge_for_export, CancellationToken, CsgOption, CsgSettings,
    ManifoldKernel, Participant,
};
use design_scene_lib::fixtures::*;
use design_scene_lib::geometry::Mesh;
use design_scene_lib::node::Node;
use design_scene_lib::schedule::Scheduler;
use design_scene_lib::settings::EngineSettings;
use design_scene_lib::validation::MeshValidator;
use glam::{Mat4, Vec3};
use shared::OutputType;

fn no_progress() -> impl FnMut(f64, Option<String>) {
    |_, _| {}
}

#[test]
fn test_touching_sets_partition_participants() {
    // two chains of touching cubes far apart plus a loner
    let mut participants = cube_row(3, 1.0, 1.0);
    participants.extend(
        cube_row(2, 1.0, 0.5)
            .into_iter()
            .map(|p| Participant::new(p.mesh, Mat4::from_translation(Vec3::Y * 50.0) * p.matrix)),
    );
    participants.push(cube_participant(1.0, Vec3::new(-40.0, 0.0, 0.0)));

    let groups = group_by_touching(&participants);
    let mut sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 2, 3]);
    assert_eq!(groups.iter().map(|g| g.len()).sum::<usize>(), participants.len());

    for (i, a) in groups.iter().enumerate() {
        for b in groups.iter().skip(i + 1) {
            for pa in a {
                assert!(b.iter().all(|pb| !pa.aabb().intersects(&pb.aabb())));
            }
        }
    }
}

#[test]
fn test_do_subtract_through_hole() {
    let block = cube_node("block", 10.0, Vec3::ZERO);
    block.set_color(shared::Color::rgb(10, 20, 30));
    let hole = Node::with_mesh(Mesh::cube(2.0, 2.0, 12.0));

    let results = do_subtract(
        None,
        &[block.clone()],
        &[hole],
        &ManifoldKernel,
        CsgSettings::from(&EngineSettings::default()),
        &mut no_progress(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.owner_id(), Some(block.id()));
    assert!(!result.visible());
    assert_eq!(result.color(), shared::Color::rgb(10, 20, 30));

    let mesh = result.mesh().unwrap();
    let v = MeshValidator::new(&mesh);
    assert!(v.assert_volume_approx(1000.0 - 40.0, 1e-2), "volume {}", v.volume());
    assert!(v.assert_dimensions_approx([10.0, 10.0, 10.0], 1e-4));
    assert!(v.is_closed());
}

#[test]
fn test_subtract_operation_rebuilds_in_scheduler() {
    let settings = EngineSettings {
        idle_interval_ms: 10,
        ..EngineSettings::default()
    };
    let scheduler = std::rc::Rc::new(Scheduler::new(&settings, std::sync::Arc::new(ManifoldKernel)));
    let root = Node::new();
    root.install_scheduler(scheduler.clone());
    let op = block_with_hole();
    root.add_child(op.clone());
    op.invalidate(&design_scene_lib::node::InvalidateArgs::new(
        &op,
        design_scene_lib::node::InvalidateType::PROPERTIES,
    ));

    assert!(scheduler.run_until_idle(Duration::from_secs(30)));
    let mesh = op.mesh().unwrap();
    assert!((mesh.volume() - 960.0).abs() < 1e-2);
    assert_eq!(op.rebuild_lock_count(), 0);
}

#[test]
fn test_export_merge_excludes_supports_and_cuts_holes() {
    let root = group_of(
        "root",
        vec![
            cube_node("a", 4.0, Vec3::ZERO),
            cube_node("b", 4.0, Vec3::new(2.0, 0.0, 0.0)),
            cube_with_output("hole", 2.0, Vec3::new(-2.0, 0.0, 0.0), OutputType::Hole),
            cube_with_output("support", 4.0, Vec3::new(0.0, 0.0, -10.0), OutputType::Support),
        ],
    );

    let merged = merge_for_export(
        &root,
        CsgOption::DoCsgMerge,
        &ManifoldKernel,
        CsgSettings::from(&EngineSettings::default()),
        &mut no_progress(),
        &CancellationToken::new(),
    )
    .unwrap()
    .unwrap();
    // union spans x -2..4 (6*4*4 = 96); the hole removes x -2..-1 (1*2*2 = 4)
    let v = MeshValidator::new(&merged);
    assert!(v.assert_volume_approx(92.0, 1e-2), "volume {}", v.volume());
    assert!(v.aabb().min.z > -3.0);

    let raw = merge_for_export(
        &root,
        CsgOption::RawMerge,
        &ManifoldKernel,
        CsgSettings::from(&EngineSettings::default()),
        &mut no_progress(),
        &CancellationToken::new(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(raw.triangle_count(), 4 * 12);
}

#[test]
fn test_cancelled_subtract_reports_cancellation() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = do_subtract(
        None,
        &[cube_node("a", 2.0, Vec3::ZERO)],
        &[cube_node("b", 1.0, Vec3::ZERO)],
        &ManifoldKernel,
        CsgSettings::from(&EngineSettings::default()),
        &mut no_progress(),
        &cancel,
    );
    assert_eq!(result.unwrap_err(), design_scene_lib::error::CsgError::Cancelled);
}

#[test]
fn test_union_is_associative_in_volume() {
    let kernel = ManifoldKernel;
    let cancel = CancellationToken::new();
    let row = cube_row(3, 2.0, 1.0);

    let all_at_once = combine_participants(&row, &kernel, &mut no_progress(), &cancel).unwrap();

    let first_pair = combine_participants(&row[..2], &kernel, &mut no_progress(), &cancel).unwrap();
    let staged = [Participant::from_mesh(first_pair, Mat4::IDENTITY), row[2].clone()];
    let in_two_steps = combine_participants(&staged, &kernel, &mut no_progress(), &cancel).unwrap();

    assert!((all_at_once.volume() - 16.0).abs() < 1e-3);
    assert!((in_two_steps.volume() - all_at_once.volume()).abs() < 1e-3);
    let a = MeshValidator::new(&all_at_once).aabb();
    let b = MeshValidator::new(&in_two_steps).aabb();
    assert!((a.min - b.min).length() < 1e-4 && (a.max - b.max).length() < 1e-4);
}
