//! Fuzz target: run each input through the supervised target program.
//!
//! The harness is configured from `TRIPWIRE_*` environment variables
//! because libFuzzer owns the command line. A crash, hang or harness
//! error panics with the case's reason so libFuzzer saves the input.
//!
//! `TRIPWIRE_CORPUS` is not read here: seed this target by passing the
//! corpus directory to libFuzzer as a positional argument.

#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use tokio::runtime::Runtime;
use tripwire_core::HarnessConfig;
use tripwire_executor::CaseSupervisor;

struct Harness {
    runtime: Runtime,
    supervisor: CaseSupervisor,
}

fn harness() -> &'static Harness {
    static HARNESS: OnceLock<Harness> = OnceLock::new();
    HARNESS.get_or_init(|| {
        if std::env::var_os("RUST_LOG").is_some() {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .init();
        }

        // Rust's main ignores SIGPIPE but libFuzzer's does not; a target that
        // exits without reading stdin would otherwise kill the fuzzer.
        #[cfg(unix)]
        // SAFETY: runs once before any thread of ours writes to a pipe, and
        // SIG_IGN installs no handler code.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }

        let config = HarnessConfig::from_env()
            .unwrap_or_else(|e| panic!("invalid TRIPWIRE_* configuration: {e}"));
        if let Some(dir) = &config.corpus_dir {
            eprintln!(
                "tripwire: TRIPWIRE_CORPUS={} is ignored by this target; pass it to libFuzzer as a corpus directory",
                dir.display()
            );
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime must build");
        let supervisor = CaseSupervisor::from_config(&config)
            .unwrap_or_else(|e| panic!("harness setup failed: {e}"));
        Harness { runtime, supervisor }
    })
}

fuzz_target!(|data: &[u8]| {
    let harness = harness();
    let report = harness.runtime.block_on(harness.supervisor.run_case(data));
    if let Some(reason) = report.outcome.reason() {
        panic!("{reason}");
    }
});
