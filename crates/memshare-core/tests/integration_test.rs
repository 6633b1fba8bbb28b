//! Cross-process tests
//!
//! Uses fork() so producer and consumer are genuinely separate processes.

#[cfg(all(test, feature = "integration"))]
mod integration {
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};
    use std::thread;
    use std::time::Duration;

    use memshare_core::{Container, Matrix, Registry, Value};

    fn unique_namespace() -> String {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::{SystemTime, UNIX_EPOCH};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("it{:x}_{}", ts as u32, COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    fn is_exit_success(status: WaitStatus) -> bool {
        matches!(status, WaitStatus::Exited(_, code) if code == 0)
    }

    /// The producer registers `ready` last; once it is visible every earlier
    /// variable is completely written.
    fn wait_until_ready(registry: &mut Registry, namespace: &str) {
        let mut attempts = 0;
        while registry.view(namespace, &["ready"]).is_err() {
            attempts += 1;
            if attempts > 40 {
                panic!("producer did not become ready after {} attempts", attempts);
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    fn produce(namespace: &str, vars: &[(&str, Value)]) -> ! {
        let mut registry = Registry::new();
        for (name, value) in vars {
            registry.register(namespace, name, value).unwrap();
        }
        registry.register(namespace, "ready", &vec![1.0]).unwrap();
        thread::sleep(Duration::from_millis(500));
        drop(registry);
        std::process::exit(0);
    }

    #[test]
    fn test_vector_cross_process() {
        let ns = unique_namespace();

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => produce(&ns, &[("x", vec![1.0, 2.0, 3.0].into())]),
            ForkResult::Parent { child } => {
                let mut registry = Registry::new();
                wait_until_ready(&mut registry, &ns);

                let views = registry.view(&ns, &["x"]).unwrap();
                let x = &views[0].1;
                assert_eq!(x.length(), 3);
                assert_eq!(x.element_at(2).unwrap().as_real(), Some(3.0));

                registry.release_view(&ns, &["x", "ready"]).unwrap();
                let status = waitpid(child, None).unwrap();
                assert!(is_exit_success(status));
            }
        }
    }

    #[test]
    fn test_list_cross_process() {
        let ns = unique_namespace();
        let list = Value::List(vec![
            vec![1.0, 2.0].into(),
            Matrix::new(2, 2, vec![3.0, 4.0, 5.0, 6.0]).unwrap().into(),
        ]);

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => produce(&ns, &[("l", list)]),
            ForkResult::Parent { child } => {
                let mut registry = Registry::new();
                wait_until_ready(&mut registry, &ns);

                let views = registry.view(&ns, &["l"]).unwrap();
                let l = &views[0].1;
                assert_eq!(l.length(), 2);
                let m = l.element_at(1).unwrap().into_container().unwrap();
                assert_eq!(m.length(), 4);
                assert_eq!(m.element_at(3).unwrap().as_real(), Some(6.0));
                assert!(l.element_at(2).is_err());

                drop(views);
                drop(registry);
                let status = waitpid(child, None).unwrap();
                assert!(is_exit_success(status));
            }
        }
    }

    #[test]
    fn test_regions_removed_after_owner_exits() {
        let ns = unique_namespace();

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => produce(&ns, &[("x", vec![1.0].into())]),
            ForkResult::Parent { child } => {
                let status = waitpid(child, None).unwrap();
                assert!(is_exit_success(status));

                let mut registry = Registry::new();
                assert!(registry.view(&ns, &["x"]).is_err());
                assert!(registry.view(&ns, &["ready"]).is_err());
            }
        }
    }
}
