use kernel_sync::SyncOnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn set_succeeds_only_once() {
    let cell = SyncOnceCell::new();
    assert!(cell.get().is_none());
    assert_eq!(cell.set(7_u32), Ok(&7));
    assert_eq!(cell.set(8), Err(8));
    assert_eq!(cell.get(), Some(&7));
    assert!(cell.is_initialized());
}

#[test]
fn get_or_init_runs_initializer_once() {
    let cell = Arc::new(SyncOnceCell::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cell = Arc::clone(&cell);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                *cell.get_or_init(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    String::from("ready")
                }) == "ready"
            })
        })
        .collect();

    for h in handles {
        assert!(h.join().unwrap());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn stored_value_is_dropped_with_the_cell() {
    let marker = Arc::new(());
    {
        let cell = SyncOnceCell::new();
        cell.set(Arc::clone(&marker)).unwrap();
        assert_eq!(Arc::strong_count(&marker), 2);
    }
    assert_eq!(Arc::strong_count(&marker), 1);
}
