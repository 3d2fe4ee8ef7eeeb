//! Whole-step properties that must hold for any partitioning.
//!
//! Each test runs a fixture basin through [`Cluster::run`] and checks
//! the merged outcome, often against the same basin on a different
//! rank count.

use std::collections::BTreeMap;
use std::thread;

use strata_comm::{mesh, CommConfig};
use strata_core::{FormationId, NodeKey};
use strata_grid::{Candidate, FormationSpec, PartitionLayout};
use strata_migration::resolver::resolve_layer;
use strata_migration::{
    BasinModel, Cluster, ClusterOutcome, MigrationConfig, MigrationStep, StepMetrics,
    StuckPolicy, TransportReport,
};
use strata_test_utils::{
    capped_dome_basin, dome_basin, flat_basin, random_basin, tilted_basin, valid_columns,
    with_warn_counter, BasinBuilder, Rock, WarnCounter,
};

// ── Helpers ────────────────────────────────────────────────────────

fn run(model: &BasinModel, ranks: u32) -> ClusterOutcome {
    let step = MigrationStep::new(MigrationConfig::default()).unwrap();
    Cluster::new(ranks).run(model, &step).unwrap()
}

fn assert_same_ledgers(a: &ClusterOutcome, b: &ClusterOutcome) {
    assert_eq!(a.ledgers().len(), b.ledgers().len());
    for (la, lb) in a.ledgers().iter().zip(b.ledgers()) {
        assert_eq!(la.formation(), lb.formation());
        let ca: Vec<_> = la.columns().collect();
        let cb: Vec<_> = lb.columns().collect();
        assert_eq!(ca.len(), cb.len());
        for ((col_a, comp_a), (col_b, comp_b)) in ca.into_iter().zip(cb) {
            assert_eq!(col_a, col_b);
            assert!((comp_a.total() - comp_b.total()).abs() < 1e-9);
        }
        assert!((la.blocked().total() - lb.blocked().total()).abs() < 1e-9);
    }
}

// ── Determinism ────────────────────────────────────────────────────

#[test]
fn random_basin_resolves_identically_on_1_2_4_8_ranks() {
    for seed in [3, 17] {
        let model = random_basin(12, seed);
        let reference = run(&model, 1);
        assert!(!reference.targets().is_empty());
        for ranks in [2, 4, 8] {
            let outcome = run(&model, ranks);
            assert_eq!(
                reference.targets(),
                outcome.targets(),
                "seed {seed}, {ranks} ranks"
            );
            assert_eq!(reference.reservoirs(), outcome.reservoirs());
            assert_same_ledgers(&reference, &outcome);
            let (r, o) = (reference.transport(), outcome.transport());
            assert!((r.stuck - o.stuck).abs() < 1e-9);
            assert!((r.eliminated - o.eliminated).abs() < 1e-9);
        }
    }
}

#[test]
fn dome_resolves_identically_on_1_and_4_ranks() {
    let model = dome_basin(10, 60.0);
    let one = run(&model, 1);
    let four = run(&model, 4);
    assert_eq!(one.targets(), four.targets());
    assert_same_ledgers(&one, &four);
    assert_eq!(one.reservoirs(), &[FormationId(1)]);
}

// ── Residual cycles ────────────────────────────────────────────────

#[test]
fn targets_are_fixed_points() {
    let model = random_basin(10, 5);
    let outcome = run(&model, 4);
    for (key, target) in outcome.targets() {
        if let Some(&next) = outcome.targets().get(target) {
            assert_eq!(next, *target, "target of {key} is not a terminus");
        }
    }
}

#[test]
fn every_source_path_ends_at_a_reservoir_top() {
    let model = dome_basin(10, 60.0);
    let outcome = run(&model, 2);
    let carrier = FormationId(1);
    assert_eq!(outcome.reservoirs(), &[carrier]);
    for (i, j) in valid_columns(10) {
        let source = NodeKey::new(FormationId(2), i, j, 0);
        let target = outcome.target(source).unwrap();
        assert_eq!(target.formation, carrier, "{source}");
        assert_eq!(target.k, 2, "{source}");
    }
}

#[test]
fn monocline_hosts_no_reservoir() {
    // Every up-dip column lies on the grid edge, where no crest is found.
    let model = tilted_basin(8, 5.0);
    let outcome = run(&model, 2);
    assert!(outcome.reservoirs().is_empty());
    assert!(outcome.ledgers().is_empty());
    assert_eq!(*outcome.transport(), TransportReport::default());
}

// ── Conservation ───────────────────────────────────────────────────

#[test]
fn closed_basin_delivers_every_charge() {
    let model = flat_basin(7);
    let outcome = run(&model, 4);
    let t = outcome.transport();
    assert_eq!(t.blocked, 0.0);
    assert_eq!(t.stuck, 0.0);
    assert_eq!(t.eliminated, 0.0);
    let ledger = outcome.ledger(FormationId(1)).unwrap();
    assert!((ledger.delivered() - model.charges.total()).abs() < 1e-9);
    for (i, j) in valid_columns(7) {
        assert_eq!(ledger.column(i, j).unwrap().total(), 1.0);
    }
}

#[test]
fn charge_is_accounted_for_in_a_rough_basin() {
    let model = random_basin(12, 23);
    let outcome = run(&model, 4);
    let t = outcome.transport();
    let accounted = t.delivered + t.blocked + t.stuck + t.eliminated;
    assert!((accounted - model.charges.total()).abs() < 1e-6);
    let delivered: f64 = outcome.ledgers().iter().map(|l| l.delivered()).sum();
    assert!((delivered - t.delivered).abs() < 1e-6);
}

// ── Thickness delegation ───────────────────────────────────────────

#[test]
fn pinched_formation_shares_the_target_above() {
    let model = BasinBuilder::new(7)
        .surface(|i, j| 4.0 * f64::from(i) + f64::from(j))
        .layer(FormationSpec::new("seal", 1), Rock::Seal, 10.0)
        .layer(FormationSpec::new("upper", 2), Rock::Carrier, 10.0)
        .layer(FormationSpec::new("pinch", 2), Rock::Carrier, 0.0)
        .layer(FormationSpec::new("lower", 2), Rock::Carrier, 10.0)
        .layer(FormationSpec::new("source", 1).source_rock(), Rock::Carrier, 10.0)
        .build();
    for ranks in [1, 2] {
        let outcome = run(&model, ranks);
        for (i, j) in valid_columns(7) {
            let above = outcome.target(NodeKey::new(FormationId(1), i, j, 0));
            assert!(above.is_some());
            for k in 0..2 {
                let pinched = NodeKey::new(FormationId(2), i, j, k);
                assert_eq!(outcome.target(pinched), above, "{pinched} on {ranks} ranks");
            }
        }
    }
}

// ── Cycles across partitions ───────────────────────────────────────

#[test]
fn cycle_across_ranks_is_repaired_once() {
    const F: FormationId = FormationId(0);
    let model = BasinBuilder::new(4)
        .layer(FormationSpec::new("carrier", 2), Rock::Carrier, 10.0)
        .build();
    let layout = PartitionLayout::new(4, 4, 2).unwrap();
    let a = NodeKey::new(F, 1, 1, 0);
    let b = NodeKey::new(F, 1, 2, 0);
    assert_ne!(layout.owner(1, 1), layout.owner(1, 2));

    // a points north at b, b points south at a; both fall back to up.
    let mut rankings: BTreeMap<NodeKey, Vec<u8>> = valid_columns(4)
        .map(|(i, j)| (NodeKey::new(F, i, j, 0), vec![0]))
        .collect();
    rankings.insert(a, vec![12, 0]);
    rankings.insert(b, vec![11, 0]);

    let counter = WarnCounter::new("strata::cycle");
    let endpoints = mesh(2, CommConfig::default()).unwrap();
    let results: Vec<(StepMetrics, BTreeMap<NodeKey, NodeKey>)> = thread::scope(|scope| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|mut endpoint| {
                let (model, layout, rankings, counter) = (&model, &layout, &rankings, &counter);
                scope.spawn(move || {
                    with_warn_counter(counter, || {
                        let rank = endpoint.rank();
                        let mut stack = model
                            .stack(layout, rank, Default::default())
                            .unwrap();
                        stack.compute_properties();
                        stack.formation_mut(F).unwrap().set_end_of_path(1);
                        for (&key, directions) in rankings {
                            if let Some(node) = stack.local_mut(key) {
                                node.path.ranking = directions
                                    .iter()
                                    .map(|&direction| Candidate {
                                        direction,
                                        score: 1.0,
                                    })
                                    .collect();
                            }
                        }
                        let mut metrics = StepMetrics::default();
                        resolve_layer(
                            &mut stack,
                            &mut endpoint,
                            F,
                            0,
                            &MigrationConfig::default(),
                            &mut metrics,
                        )
                        .unwrap();
                        let targets = rankings
                            .keys()
                            .filter_map(|&k| stack.target_of(k).map(|t| (k, t)))
                            .filter(|(k, _)| stack.is_local(*k))
                            .collect::<BTreeMap<_, _>>();
                        (metrics, targets)
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(counter.count(), 1);
    let mut targets = BTreeMap::new();
    for (metrics, owned) in results {
        assert_eq!(metrics.cycles_repaired, 1);
        assert!(metrics.stalled_rounds >= 1);
        targets.extend(owned);
    }
    assert_eq!(targets.len(), 9);
    assert_eq!(targets[&a], NodeKey::new(F, 1, 1, 1));
    assert_eq!(targets[&b], NodeKey::new(F, 1, 1, 1));
    assert_eq!(targets[&NodeKey::new(F, 2, 0, 0)], NodeKey::new(F, 2, 0, 1));
}

// ── Transport warnings ─────────────────────────────────────────────

#[test]
fn lost_charge_is_reported_once_by_rank_zero() {
    let model = capped_dome_basin(10, 60.0);
    let config = MigrationConfig {
        detect_reservoirs: false,
        stuck_policy: StuckPolicy::Eliminate,
        ..MigrationConfig::default()
    };
    let step = MigrationStep::new(config).unwrap();
    let layout = PartitionLayout::new(model.grid.0, model.grid.1, 2).unwrap();
    let counters = [
        WarnCounter::new("strata::transport"),
        WarnCounter::new("strata::transport"),
    ];

    let endpoints = mesh(2, CommConfig::default()).unwrap();
    let eliminated: Vec<(u32, f64)> = thread::scope(|scope| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .zip(&counters)
            .map(|(mut endpoint, counter)| {
                let (model, layout, step) = (&model, &layout, &step);
                scope.spawn(move || {
                    with_warn_counter(counter, || {
                        let rank = endpoint.rank();
                        let mut stack = model
                            .stack(layout, rank, step.config().blocking)
                            .unwrap();
                        let outcome = step
                            .run(&mut stack, &mut endpoint, &model.charges)
                            .unwrap();
                        (rank.0, outcome.transport.eliminated)
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(eliminated.iter().map(|&(r, _)| r).collect::<Vec<_>>(), vec![0, 1]);
    // Both ranks see the reduced mass, but only rank 0 speaks.
    assert!(eliminated[0].1 > 0.0);
    assert_eq!(eliminated[0].1, eliminated[1].1);
    assert_eq!(counters[0].count(), 1);
    assert_eq!(counters[1].count(), 0);
}
