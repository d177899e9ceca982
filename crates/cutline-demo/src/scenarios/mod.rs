pub mod chandy_lamport;
pub mod lai_yang;

use cutline::{Cluster, Reporter, SessionOutcome};

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

/// Wait for the session, print it and check the cut. Shuts the cluster down
/// either way.
pub async fn report(cluster: Cluster, output: Output) -> Result<(), String> {
    let outcome = Reporter::from_config(cluster.config())
        .collect(&cluster)
        .await
        .map_err(|e| e.to_string());

    for handle in cluster.handles() {
        let stats = handle.channel_stats().await.map_err(|e| e.to_string())?;
        for channel in stats.iter().filter(|c| c.from == handle.id()) {
            tracing::debug!(
                channel = %channel.name,
                sent = channel.sent,
                received = channel.received,
                high_watermark = channel.high_watermark,
                "channel stats"
            );
        }
    }
    cluster.shutdown().await;

    match outcome? {
        SessionOutcome::Complete(snapshot) => {
            println!("global snapshot ({} strategy):", snapshot.strategy);
            for line in snapshot.summary() {
                println!("  {line}");
            }
            if output.json {
                println!("{}", snapshot.to_json()?);
            }
            match snapshot.check_consistency() {
                Ok(()) => {
                    println!("cut is consistent");
                    Ok(())
                }
                Err(problems) => {
                    for problem in &problems {
                        println!("  inconsistent: {problem}");
                    }
                    Err(format!("{} inconsistencies in the cut", problems.len()))
                }
            }
        }
        SessionOutcome::Incomplete { completed, pending } => {
            let pending: Vec<String> = pending.iter().map(ToString::to_string).collect();
            Err(format!(
                "snapshot incomplete: {} processes finished, still waiting on {}",
                completed.len(),
                pending.join(", ")
            ))
        }
    }
}
