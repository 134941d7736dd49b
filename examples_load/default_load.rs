use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use firehose_log_sink::init::init_tracing;
use firehose_log_sink::noop_client::NoopClient;
use firehose_log_sink::FirehoseHook;

#[tokio::main]
async fn main() {
    let hook = Arc::new(FirehoseHook::new("load-test", NoopClient));
    init_tracing(hook.clone()).expect("set global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
        if i % 500 == 499 {
            hook.flush().await.expect("hook closed");
        }
    }

    let elapsed = start.elapsed();
    println!("default config: fired {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let summary = hook.close().await.expect("hook closed");
    println!("last flush: {:?}, totals: {:?}", summary, hook.stats());
}
