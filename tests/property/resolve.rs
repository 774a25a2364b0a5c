use std::collections::{BTreeSet, HashMap, HashSet};

use proptest::prelude::*;
use taskhost::dag::DependencyGraph;
use taskhost::errors::ServiceError;

type Registration = Vec<(String, Vec<String>)>;

// Acyclic by construction: task N only depends on tasks 0..N-1. The
// registration order is then shuffled so it has nothing to do with the
// dependency order.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Registration> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let deps_strat = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        );

        deps_strat
            .prop_map(|raw_deps| {
                raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, potential)| {
                        let deps: BTreeSet<usize> = if i == 0 {
                            BTreeSet::new()
                        } else {
                            potential.into_iter().map(|d| d % i).collect()
                        };
                        (
                            format!("task_{i}"),
                            deps.into_iter().map(|d| format!("task_{d}")).collect(),
                        )
                    })
                    .collect::<Registration>()
            })
            .prop_shuffle()
    })
}

fn build(registration: &Registration) -> Result<DependencyGraph, ServiceError> {
    DependencyGraph::build(registration.iter().cloned())
}

proptest! {
    #[test]
    fn start_order_is_a_deterministic_topological_order(registration in dag_strategy(12)) {
        let graph = build(&registration).unwrap();
        let order = graph.resolve().unwrap();
        let start = order.start();

        prop_assert_eq!(start.len(), registration.len());

        let position: HashMap<&str, usize> = start
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        for (name, deps) in &registration {
            for dep in deps {
                prop_assert!(position[dep.as_str()] < position[name.as_str()]);
            }
        }

        // Same registration, same answer.
        prop_assert_eq!(build(&registration).unwrap().resolve().unwrap(), order.clone());

        let mut reversed = start.to_vec();
        reversed.reverse();
        prop_assert_eq!(order.stop(), reversed);
    }

    #[test]
    fn ready_tasks_start_in_registration_order(registration in dag_strategy(12)) {
        let order = build(&registration).unwrap().resolve().unwrap();
        let mut placed: HashSet<&str> = HashSet::new();

        for name in order.start() {
            let first_ready = registration
                .iter()
                .find(|(candidate, deps)| {
                    !placed.contains(candidate.as_str())
                        && deps.iter().all(|d| placed.contains(d.as_str()))
                })
                .map(|(candidate, _)| candidate.as_str());
            prop_assert_eq!(first_ready, Some(name.as_str()));
            placed.insert(name.as_str());
        }
    }

    #[test]
    fn a_back_edge_is_reported_as_a_cycle(registration in dag_strategy(12)) {
        let Some((dependent, dependency)) = registration
            .iter()
            .find_map(|(name, deps)| deps.first().map(|d| (name.clone(), d.clone())))
        else {
            return Ok(());
        };

        let mut cyclic = registration.clone();
        for (name, deps) in &mut cyclic {
            if *name == dependency {
                deps.push(dependent.clone());
            }
        }

        match build(&cyclic).unwrap().resolve() {
            Err(ServiceError::DependencyCycle(msg)) => {
                prop_assert!(msg.contains(&dependent), "{}", msg);
                prop_assert!(msg.contains(&dependency), "{}", msg);
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other),
        }
    }
}
