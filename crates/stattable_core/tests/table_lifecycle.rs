use stattable_core::{
    find_table_extension, include_owned_table_extension, include_table_extension, HookError,
    HookResult, Host, HostError, Ownership, Stage, TableExtension, TableId, TableIdentity,
};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

type EventLog = Rc<RefCell<Vec<String>>>;

struct GapTable {
    identity: TableIdentity,
    events: EventLog,
    fail_on: Option<&'static str>,
}

impl GapTable {
    fn new(host: &Host, name: &str, events: &EventLog) -> Self {
        Self {
            identity: TableIdentity::new(host.handle(), name, "gap statistics", 1000, Stage::Solving)
                .expect("identity"),
            events: Rc::clone(events),
            fail_on: None,
        }
    }

    fn record(&self, hook: &'static str) -> HookResult<()> {
        self.events
            .borrow_mut()
            .push(format!("{}:{hook}", self.identity.name()));
        if self.fail_on == Some(hook) {
            return Err(HookError::failed(format!("{hook} failed")));
        }
        Ok(())
    }
}

impl TableExtension for GapTable {
    fn identity(&self) -> &TableIdentity {
        &self.identity
    }

    fn free(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        self.record("free")
    }

    fn init(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        self.record("init")
    }

    fn exit(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        self.record("exit")
    }

    fn init_solve(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        self.record("init_solve")
    }

    fn exit_solve(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        self.record("exit_solve")
    }

    fn output(&mut self, _host: &Host, _table: TableId, sink: &mut dyn Write) -> HookResult<()> {
        self.record("output")?;
        writeln!(sink, "Gap statistics   :       0.00 %")?;
        Ok(())
    }
}

impl Drop for GapTable {
    fn drop(&mut self) {
        self.events
            .borrow_mut()
            .push(format!("{}:drop", self.identity.name()));
    }
}

fn count(events: &EventLog, entry: &str) -> usize {
    events.borrow().iter().filter(|event| *event == entry).count()
}

#[test]
fn host_owned_table_is_freed_and_dropped_once_on_shutdown() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    let handle = host.handle().clone();
    let table = GapTable::new(&host, "gapstat", &events);
    include_owned_table_extension(&mut host, table).expect("include");

    host.transform().expect("transform");
    host.solve().expect("solve");
    host.print_statistics(&mut Vec::new()).expect("print");
    host.free().expect("free");

    assert_eq!(
        *events.borrow(),
        vec![
            "gapstat:init",
            "gapstat:init_solve",
            "gapstat:output",
            "gapstat:exit_solve",
            "gapstat:exit",
            "gapstat:free",
            "gapstat:drop",
        ]
    );
    assert_eq!(count(&events, "gapstat:free"), 1);
    assert_eq!(count(&events, "gapstat:drop"), 1);
    assert!(handle.memory_stats().is_balanced());
}

#[test]
fn caller_owned_table_outlives_host_shutdown() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    let handle = host.handle().clone();
    let table = Rc::new(RefCell::new(GapTable::new(&host, "gapstat", &events)));
    include_table_extension(&mut host, table.clone(), Ownership::Caller).expect("include");

    host.free().expect("free");
    assert_eq!(count(&events, "gapstat:free"), 1);
    assert_eq!(count(&events, "gapstat:drop"), 0);
    assert_eq!(table.borrow().identity().name(), "gapstat");
    assert_eq!(handle.memory_stats().live_allocations, 2);

    drop(table);
    assert_eq!(count(&events, "gapstat:drop"), 1);
    assert!(handle.memory_stats().is_balanced());
}

#[test]
fn dropping_host_without_free_still_runs_teardown() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    let table = GapTable::new(&host, "gapstat", &events);
    include_owned_table_extension(&mut host, table).expect("include");
    host.transform().expect("transform");

    drop(host);
    assert_eq!(
        *events.borrow(),
        vec!["gapstat:init", "gapstat:exit", "gapstat:free", "gapstat:drop"]
    );
}

#[test]
fn hook_failure_propagates_and_teardown_still_releases_everything() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    let handle = host.handle().clone();
    let mut table = GapTable::new(&host, "gapstat", &events);
    table.fail_on = Some("free");
    include_owned_table_extension(&mut host, table).expect("include");
    let healthy = GapTable::new(&host, "other", &events);
    include_owned_table_extension(&mut host, healthy).expect("include");

    let err = host.free().expect_err("free failure must be reported");
    assert!(matches!(
        err,
        HostError::Hook {
            hook: "free",
            source: HookError::Failed(_),
            ..
        }
    ));
    assert_eq!(count(&events, "other:free"), 1);
    assert_eq!(count(&events, "gapstat:drop"), 1);
    assert_eq!(count(&events, "other:drop"), 1);
    assert!(handle.memory_stats().is_balanced());
}

#[test]
fn output_waits_for_earliest_stage() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    let table = GapTable::new(&host, "gapstat", &events);
    include_owned_table_extension(&mut host, table).expect("include");

    let mut out = Vec::new();
    host.print_statistics(&mut out).expect("print before solve");
    assert!(out.is_empty());

    host.transform().expect("transform");
    host.solve().expect("solve");
    host.print_statistics(&mut out).expect("print after solve");
    assert_eq!(
        String::from_utf8(out).expect("utf8"),
        "Gap statistics   :       0.00 %\n"
    );
}

#[test]
fn host_shutdown_drops_its_observer_of_caller_owned_table() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    let table = Rc::new(RefCell::new(GapTable::new(&host, "gapstat", &events)));
    include_table_extension(&mut host, table.clone(), Ownership::Caller).expect("include");
    assert!(find_table_extension(&host, "gapstat").is_some());
    assert_eq!(Rc::weak_count(&table), 1);

    host.free().expect("free");
    assert_eq!(Rc::strong_count(&table), 1);
    assert_eq!(Rc::weak_count(&table), 0);
}

fn include_pair(host: &mut Host, events: &EventLog, fail_on: (&str, &'static str)) {
    for name in ["a", "b"] {
        let mut table = GapTable::new(host, name, events);
        if name == fail_on.0 {
            table.fail_on = Some(fail_on.1);
        }
        include_owned_table_extension(host, table).expect("include");
    }
}

#[test]
fn init_failure_exits_initialized_tables_and_host_recovers() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    let handle = host.handle().clone();
    include_pair(&mut host, &events, ("b", "init"));

    let err = host.transform().expect_err("init failure must propagate");
    assert!(matches!(
        err,
        HostError::Hook { ref table, hook: "init", .. } if table == "b"
    ));
    assert_eq!(host.stage(), Stage::Problem);
    assert_eq!(*events.borrow(), vec!["a:init", "b:init", "a:exit"]);

    assert!(matches!(
        host.transform(),
        Err(HostError::Hook { hook: "init", .. })
    ));
    host.free().expect("free after failed transform");
    assert_eq!(count(&events, "a:exit"), 2);
    assert_eq!(count(&events, "b:exit"), 0);
    assert_eq!(count(&events, "a:free"), 1);
    assert_eq!(count(&events, "b:free"), 1);
    assert_eq!(count(&events, "a:drop"), 1);
    assert_eq!(count(&events, "b:drop"), 1);
    assert!(handle.memory_stats().is_balanced());
}

#[test]
fn init_solve_failure_rolls_back_and_free_exits_every_table() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    include_pair(&mut host, &events, ("b", "init_solve"));

    host.transform().expect("transform");
    let err = host.solve().expect_err("init_solve failure must propagate");
    assert!(matches!(
        err,
        HostError::Hook {
            hook: "init_solve",
            ..
        }
    ));
    assert_eq!(host.stage(), Stage::Transformed);

    host.free().expect("free after failed solve");
    assert_eq!(
        *events.borrow(),
        vec![
            "a:init",
            "b:init",
            "a:init_solve",
            "b:init_solve",
            "a:exit_solve",
            "a:exit",
            "b:exit",
            "a:free",
            "a:drop",
            "b:free",
            "b:drop",
        ]
    );
}

#[test]
fn exit_solve_failure_does_not_stop_teardown() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    let handle = host.handle().clone();
    include_pair(&mut host, &events, ("a", "exit_solve"));
    host.transform().expect("transform");
    host.solve().expect("solve");

    let err = host.free().expect_err("exit_solve failure must be reported");
    assert!(matches!(
        err,
        HostError::Hook { ref table, hook: "exit_solve", .. } if table == "a"
    ));
    assert_eq!(count(&events, "b:exit_solve"), 1);
    assert_eq!(count(&events, "a:exit"), 1);
    assert_eq!(count(&events, "b:exit"), 1);
    assert_eq!(count(&events, "a:free"), 1);
    assert_eq!(count(&events, "b:free"), 1);
    assert_eq!(count(&events, "a:drop"), 1);
    assert_eq!(count(&events, "b:drop"), 1);
    assert!(handle.memory_stats().is_balanced());
}

#[test]
fn exit_failure_returns_host_to_problem() {
    let events = EventLog::default();
    let mut host = Host::with_defaults();
    include_pair(&mut host, &events, ("a", "exit"));
    host.transform().expect("transform");

    let err = host.free_transform().expect_err("exit failure must propagate");
    assert!(matches!(err, HostError::Hook { hook: "exit", .. }));
    assert_eq!(host.stage(), Stage::Problem);
    assert_eq!(count(&events, "b:exit"), 1);

    host.transform().expect("transform again");
    assert_eq!(count(&events, "a:init"), 2);
    let err = host.free().expect_err("exit failure during teardown");
    assert!(matches!(err, HostError::Hook { hook: "exit", .. }));
    assert_eq!(count(&events, "b:exit"), 2);
    assert_eq!(count(&events, "a:drop"), 1);
    assert_eq!(count(&events, "b:drop"), 1);
}
