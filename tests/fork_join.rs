mod common;

use common::{simulate, single_tier};
use perfsim::model::builder::usage;
use perfsim::model::{Behavior, BehaviorBuilder, CharacterisationKind};
use perfsim::simulation::{RequestSpec, RequestStatus, SimTime};

fn demand(name: &str, resource: &str, amount: &str) -> Behavior {
    BehaviorBuilder::new(name)
        .internal("work", &[(resource, amount)])
        .build()
        .unwrap()
}

fn request() -> RequestSpec {
    RequestSpec::new("app-1", "run")
}

#[test]
fn caller_waits_for_synchronous_behaviors_only() {
    let behavior = BehaviorBuilder::new("run")
        .fork(
            "split",
            vec![demand("a", "CPU", "5.0"), demand("b", "CPU", "7.0")],
            vec![demand("c", "HDD", "2.0")],
        )
        .internal("after", &[("MARK", "1.0")])
        .build()
        .unwrap();
    let (report, registry) = simulate(single_tier(vec![("run", behavior)]), vec![request()]);

    let cpu = registry.on("CPU");
    assert_eq!(cpu.len(), 2);
    assert!(cpu.iter().all(|d| d.at == 0.0 && d.process.starts_with("request-0/async-")));
    let hdd = registry.on("HDD");
    assert_eq!(hdd.len(), 1);
    assert_eq!(hdd[0].process, "request-0/sync-2");

    let mark = registry.on("MARK");
    assert_eq!(mark.len(), 1);
    assert_eq!(mark[0].at, 2.0);
    assert_eq!(mark[0].process, "request-0");

    assert_eq!(report.requests[0].status, RequestStatus::Completed);
    assert_eq!(report.requests[0].response_time, Some(3.0));
    assert_eq!(report.simulated_time, SimTime::new(7.0));
}

#[test]
fn synchronous_behaviors_run_concurrently() {
    let behavior = BehaviorBuilder::new("run")
        .fork(
            "split",
            Vec::new(),
            vec![demand("a", "CPU", "3.0"), demand("b", "HDD", "5.0")],
        )
        .internal("after", &[("MARK", "0")])
        .build()
        .unwrap();
    let (_, registry) = simulate(single_tier(vec![("run", behavior)]), vec![request()]);

    assert_eq!(registry.on("MARK")[0].at, 5.0);
}

#[test]
fn asynchronous_only_fork_does_not_block() {
    let behavior = BehaviorBuilder::new("run")
        .fork("split", vec![demand("a", "CPU", "4.0")], Vec::new())
        .internal("after", &[("MARK", "1")])
        .build()
        .unwrap();
    let (report, registry) = simulate(single_tier(vec![("run", behavior)]), vec![request()]);

    assert_eq!(registry.on("MARK")[0].at, 0.0);
    assert_eq!(report.requests[0].response_time, Some(1.0));
    assert_eq!(report.simulated_time, SimTime::new(4.0));
}

#[test]
fn failing_synchronous_behavior_fails_caller() {
    let broken = BehaviorBuilder::new("broken")
        .repeat("loop", "0 - 1", BehaviorBuilder::new("body").build().unwrap())
        .build()
        .unwrap();
    let behavior = BehaviorBuilder::new("run")
        .fork("split", Vec::new(), vec![broken, demand("ok", "CPU", "1.0")])
        .internal("after", &[("MARK", "1")])
        .build()
        .unwrap();
    let (report, registry) = simulate(single_tier(vec![("run", behavior)]), vec![request()]);

    let outcome = &report.requests[0];
    assert_eq!(outcome.status, RequestStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("forked behavior"));
    assert_eq!(outcome.completion, Some(SimTime::new(1.0)));
    assert!(registry.on("MARK").is_empty());
}

#[test]
fn failing_asynchronous_behavior_is_only_logged() {
    let broken = BehaviorBuilder::new("broken")
        .internal("work", &[("CPU", "missing.VALUE")])
        .build()
        .unwrap();
    let behavior = BehaviorBuilder::new("run")
        .fork("split", vec![broken], Vec::new())
        .internal("after", &[("MARK", "1")])
        .build()
        .unwrap();
    let (report, registry) = simulate(single_tier(vec![("run", behavior)]), vec![request()]);

    assert_eq!(report.requests[0].status, RequestStatus::Completed);
    assert_eq!(registry.on("MARK").len(), 1);
}

#[test]
fn forked_behaviors_see_a_copy_of_the_caller_stack() {
    let reader = BehaviorBuilder::new("reader")
        .internal("work", &[("CPU", "x.VALUE")])
        .set_variable(
            "local",
            vec![usage("leak", CharacterisationKind::Value, "1").unwrap()],
        )
        .build()
        .unwrap();
    let behavior = BehaviorBuilder::new("run")
        .fork("split", Vec::new(), vec![reader])
        .build()
        .unwrap();
    let input = usage("x", CharacterisationKind::Value, "4").unwrap();
    let (report, registry) = simulate(
        single_tier(vec![("run", behavior)]),
        vec![request().with_input(input)],
    );

    assert_eq!(registry.amounts(), vec![4.0]);
    assert_eq!(report.requests[0].status, RequestStatus::Completed);
    assert!(!report.requests[0].results.contains_key("leak.VALUE"));
}
