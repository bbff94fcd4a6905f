//! Hardware get-on-fault over real memory protection.
//!
//! Runs two ranks in one process over `SysMemory`, installs the SIGSEGV
//! hook, and dereferences a raw pointer into a peer-owned page. The
//! handler must page the data in and restart the faulting load. Kept in
//! its own binary: the hook is process-wide and outlives no runtime.

#![cfg(target_os = "linux")]

use pagas_runtime::{DistArray, Runtime, RuntimeConfig, SysMemory};
use pagas_transport::LocalCluster;

#[test]
fn raw_pointer_read_pages_foreign_data_in() {
    let endpoints = LocalCluster::new(2).into_endpoints();
    let handles: Vec<_> = endpoints
        .into_iter()
        .map(|ep| {
            std::thread::spawn(move || {
                let config = RuntimeConfig::new().with_cache_budget(64 * 1024);
                let rt = Runtime::init(ep, SysMemory::new(), config).unwrap();

                let a: DistArray<u64> = rt.allocate_array(4096, 4096).unwrap();
                a.fill_owned(&rt, |i| 3 * i as u64).unwrap();
                rt.sync().unwrap();

                if rt.rank() == 0 {
                    assert!(rt.install_fault_handler());

                    // Element 3000 lives in rank 1's block and is not
                    // resident; the load itself must trigger the fetch.
                    let before = rt.stats().faults;
                    let v = unsafe { *a.as_ptr(3000) };
                    assert_eq!(v, 9000);
                    assert_eq!(rt.stats().faults, before + 1);

                    // Same page again: resident now, no second fault.
                    let v = unsafe { *a.as_ptr(3001) };
                    assert_eq!(v, 9003);
                    assert_eq!(rt.stats().faults, before + 1);
                }

                rt.free_array(a).unwrap();
                rt.finalize(0).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}
