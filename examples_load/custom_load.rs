use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use firehose_log_sink::init::{init_tracing_with_config, InitConfig};
use firehose_log_sink::noop_client::NoopClient;
use firehose_log_sink::{FirehoseHook, HookConfig, Level};

#[tokio::main]
async fn main() {
    let hook_config = HookConfig {
        channel_capacity: 50_000,
        request_timeout: Duration::from_secs(5),
        levels: Some(vec![Level::Error]),
        add_newline: true,
        ..HookConfig::default()
    };
    let hook = Arc::new(FirehoseHook::with_config("load-test", NoopClient, hook_config));

    init_tracing_with_config(hook.clone(), InitConfig { enable_stdout: false })
        .expect("set global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
        if i % 10_000 == 9_999 {
            hook.flush_sync().await.expect("hook closed");
        }
    }

    let elapsed = start.elapsed();
    println!("custom config: fired {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    hook.close().await.expect("hook closed");
    println!("totals: {:?}", hook.stats());
}
