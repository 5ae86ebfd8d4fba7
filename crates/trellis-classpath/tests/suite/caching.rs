use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use trellis_classpath::{GraphError, ViewKey, ViewKind};
use trellis_project::{ProjectSnapshot, SourceRootKind};

use super::support::{compile_dep, counting_context, paths};

fn snapshot() -> ProjectSnapshot {
    let mut snapshot = ProjectSnapshot::maven_layout("/p");
    snapshot.dependencies = vec![
        compile_dep("a", "1.0", "/repo/a-1.0.jar"),
        compile_dep("b", "1.0", "/repo/b-1.0.jar"),
    ];
    snapshot
}

#[test]
fn repeated_queries_return_the_same_view() {
    let repo = TempDir::new().unwrap();
    let (ctx, resolver) = counting_context(snapshot(), repo.path());

    let first = ctx.view(ViewKind::Runtime, SourceRootKind::Test);
    let calls = resolver.calls();
    let second = ctx.view(ViewKind::Runtime, SourceRootKind::Test);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.calls(), calls);
    assert!(ctx.is_current(
        ViewKey::new(ViewKind::Runtime, SourceRootKind::Test),
        &first
    ));
}

#[test]
fn concurrent_first_queries_compute_once() {
    const THREADS: usize = 8;
    let repo = TempDir::new().unwrap();
    let (ctx, resolver) = counting_context(snapshot(), repo.path());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ctx = ctx.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ctx.view(ViewKind::LegacyCompile, SourceRootKind::Main)
            })
        })
        .collect();

    let views: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for view in &views[1..] {
        assert!(Arc::ptr_eq(&views[0], view));
    }
    assert_eq!(resolver.calls(), 1);
}

#[test]
fn invalidation_is_limited_to_affected_views() {
    let repo = TempDir::new().unwrap();
    let (ctx, _resolver) = counting_context(snapshot(), repo.path());

    let source = ctx.view(ViewKind::Source, SourceRootKind::Main);
    let boot = ctx.view(ViewKind::LegacyBoot, SourceRootKind::Main);
    let compile = ctx.view(ViewKind::Compile, SourceRootKind::Main);

    let invalidated = ctx.declare_dependency(compile_dep("c", "1.0", "/repo/c-1.0.jar")).unwrap();
    assert!(invalidated.contains(&ViewKey::new(ViewKind::Compile, SourceRootKind::Main)));
    assert!(!invalidated.contains(&ViewKey::new(ViewKind::Source, SourceRootKind::Main)));

    assert!(Arc::ptr_eq(&source, &ctx.view(ViewKind::Source, SourceRootKind::Main)));
    assert!(Arc::ptr_eq(&boot, &ctx.view(ViewKind::LegacyBoot, SourceRootKind::Main)));
    let recomputed = ctx.view(ViewKind::Compile, SourceRootKind::Main);
    assert!(!Arc::ptr_eq(&compile, &recomputed));
    assert_eq!(recomputed.len(), 3);
}

#[test]
fn listeners_observe_the_new_value_when_they_requery() {
    let repo = TempDir::new().unwrap();
    let (ctx, _resolver) = counting_context(snapshot(), repo.path());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let _subscription = {
        let weak = ctx.downgrade();
        let seen = Arc::clone(&seen);
        ctx.subscribe(ViewKind::Compile, SourceRootKind::Main, move || {
            let Some(ctx) = weak.upgrade() else {
                return;
            };
            let view = ctx.view(ViewKind::Compile, SourceRootKind::Main);
            seen.lock().unwrap().push(paths(view.entries()));
        })
    };

    assert_eq!(ctx.view(ViewKind::Compile, SourceRootKind::Main).len(), 2);
    ctx.declare_dependency(compile_dep("c", "1.0", "/repo/c-1.0.jar")).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].len(), 3);
}

#[test]
fn dropped_subscriptions_stop_notifying() {
    let repo = TempDir::new().unwrap();
    let (ctx, _resolver) = counting_context(snapshot(), repo.path());
    let calls = Arc::new(AtomicUsize::new(0));

    let subscription = {
        let calls = Arc::clone(&calls);
        ctx.subscribe(ViewKind::Runtime, SourceRootKind::Main, move || {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    };

    ctx.view(ViewKind::Runtime, SourceRootKind::Main);
    ctx.declare_dependency(compile_dep("c", "1.0", "/repo/c-1.0.jar")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    ctx.view(ViewKind::Runtime, SourceRootKind::Main);
    ctx.declare_dependency(compile_dep("d", "1.0", "/repo/d-1.0.jar")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn declared_view_edges_propagate_and_reject_cycles() {
    let repo = TempDir::new().unwrap();
    let (ctx, _resolver) = counting_context(snapshot(), repo.path());
    let source = ViewKey::new(ViewKind::Source, SourceRootKind::Main);
    let processor = ViewKey::new(ViewKind::Processor, SourceRootKind::Main);

    ctx.declare_view_dependency(processor, source).unwrap();
    let first = ctx.view_for(processor);
    ctx.view_for(source);
    let invalidated = ctx.set_resource_roots(Vec::new()).unwrap();
    assert!(invalidated.contains(&processor));
    assert!(!ctx.is_current(processor, &first));

    let boot = ViewKey::new(ViewKind::LegacyBoot, SourceRootKind::Main);
    let compile = ViewKey::new(ViewKind::Compile, SourceRootKind::Main);
    assert_eq!(
        ctx.declare_view_dependency(boot, compile),
        Err(GraphError::Cycle {
            dependent: boot,
            dependency: compile,
        })
    );
}
