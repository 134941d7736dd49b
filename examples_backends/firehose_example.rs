use std::sync::Arc;

use tracing::{error, info, warn};
use firehose_log_sink::{init::init_tracing, FirehoseHook};

/// Ships application logs to an Amazon Data Firehose delivery stream.
/// Credentials and region come from the usual AWS provider chain.
#[tokio::main]
async fn main() {
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let hook = Arc::new(FirehoseHook::from_sdk_config("app-logs", sdk_config));
    hook.add_newline(true);
    hook.add_ignore("password");

    let mut errors = hook.errors();
    tokio::spawn(async move {
        while let Ok(err) = errors.recv().await {
            eprintln!("firehose delivery failed: {}", err);
        }
    });

    init_tracing(hook.clone()).expect("set global subscriber");

    info!("starting service");
    warn!(attempt = 3, "slow upstream");
    error!(
        user_id = 42,
        reason = "invalid password",
        password = "hunter2",
        "authentication failed"
    );

    let summary = hook.flush_sync().await.expect("hook closed");
    println!("delivered {} records in {} batches", summary.delivered, summary.batches);
    hook.close().await.expect("hook closed");
}
