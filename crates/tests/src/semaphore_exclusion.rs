//! Named semaphore exclusivity across independent handles
//!
//! Each thread opens its own handle, the way separate avolt processes do, and
//! performs a deliberately racy read-modify-write inside the guard.

use avolt_core::domain::{
    resolve_profiles, ConcurrencyGuard, MemoryElement, MemoryMixer, ProfileConfig, Range,
    ToggleGroup, VolumeChange, VolumeChangeEngine, VolumeRepresentation, VolumeRequest,
};
use avolt_infra::NamedSemaphore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn unique_name(tag: &str) -> String {
    format!("avolt-it-{}-{tag}", std::process::id())
}

#[test]
fn test_guarded_increments_never_interleave() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 50;

    let name = unique_name("counter");
    let counter = Arc::new(AtomicUsize::new(0));
    let inside = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let name = name.clone();
            let counter = Arc::clone(&counter);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            thread::spawn(move || {
                let semaphore = NamedSemaphore::open(&name).unwrap();
                let mut acquired = 0;
                for _ in 0..ROUNDS {
                    semaphore
                        .with_guard(|| {
                            if inside.swap(true, Ordering::SeqCst) {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            let seen = counter.load(Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(50));
                            counter.store(seen + 1, Ordering::SeqCst);
                            inside.store(false, Ordering::SeqCst);
                        })
                        .unwrap();
                    acquired += 1;
                }
                acquired
            })
        })
        .collect();

    let acquisitions: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(acquisitions, THREADS * ROUNDS);
    assert_eq!(counter.load(Ordering::SeqCst), acquisitions);

    NamedSemaphore::unlink(&name).unwrap();
}

#[test]
fn test_engine_under_named_semaphore() {
    let name = unique_name("engine");
    let semaphore = NamedSemaphore::open(&name).unwrap();
    let mixer = MemoryMixer::new()
        .with_element(MemoryElement::new("Master", Range::new(0, 100)).with_volume(40));
    let profiles = resolve_profiles(
        &[ProfileConfig {
            name: "master".to_string(),
            element: "Master".to_string(),
            control_element: None,
            default_volume: 32,
            volume_type: VolumeRepresentation::HardwarePercentage,
            soft_limit_volume: 100,
            set_default_volume: false,
            confirm_exceeding_limit: false,
        }],
        &mixer,
    )
    .unwrap();

    {
        let engine = VolumeChangeEngine::new(&mixer, &semaphore);
        for _ in 0..3 {
            let outcome = engine.execute(
                &VolumeRequest::new(VolumeChange::SetRelative(-10)),
                &profiles,
                &ToggleGroup::default(),
            );
            assert!(outcome.is_success(), "{}", outcome.message);
            assert!(outcome.error.is_none(), "{}", outcome.message);
        }
    }
    assert_eq!(mixer.snapshot("Master").unwrap().left, 10);

    // A permit that leaked would make this block
    assert!(semaphore.with_guard(|| ()).is_ok());

    drop(semaphore);
    NamedSemaphore::unlink(&name).unwrap();
}
