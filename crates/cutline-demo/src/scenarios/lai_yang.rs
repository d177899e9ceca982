use std::time::Duration;

use cutline::{Cluster, CutlineConfig, ProcessHandle};
use cutline_types::{Color, StrategyKind};

use super::{Output, report};

const STEP: Duration = Duration::from_millis(40);

async fn send(cluster: &Cluster, from: u32, to: u32, payload: &str) -> Result<(), String> {
    cluster
        .send(from, to, payload)
        .await
        .map_err(|e| e.to_string())?;
    let color = cluster
        .handle(from)
        .and_then(|h| h.status().color)
        .unwrap_or_default();
    println!("P{from} -> P{to}: {payload} ({color})");
    Ok(())
}

async fn wait_red(handle: &ProcessHandle) -> Result<(), String> {
    handle
        .wait_until(|status| status.color == Some(Color::Red))
        .await
        .map_err(|e| e.to_string())?;
    println!("{} is red", handle.id());
    Ok(())
}

fn handle(cluster: &Cluster, id: u32) -> Result<&ProcessHandle, String> {
    cluster
        .handle(id)
        .ok_or_else(|| format!("P{id} missing from cluster"))
}

pub async fn run(config: CutlineConfig, output: Output) -> Result<(), String> {
    let cluster = Cluster::complete(3, config.with_strategy(StrategyKind::Color))
        .map_err(|e| e.to_string())?;

    for (from, to, payload) in [(1, 2, "A"), (2, 3, "B"), (3, 1, "C")] {
        send(&cluster, from, to, payload).await?;
        tokio::time::sleep(STEP).await;
    }

    println!("--- P1 initiates snapshot (turns red) ---");
    let p1 = handle(&cluster, 1)?;
    p1.initiate_snapshot().await.map_err(|e| e.to_string())?;
    wait_red(p1).await?;

    // P2 is still white, so D is pre-cut traffic that P1 may already count
    // as in transit.
    send(&cluster, 2, 1, "D").await?;
    send(&cluster, 1, 2, "E").await?;
    wait_red(handle(&cluster, 2)?).await?;
    send(&cluster, 3, 2, "F").await?;

    // every channel has to carry one red message before its receiver can
    // finish
    println!("--- red traffic on the remaining channels ---");
    send(&cluster, 2, 1, "G").await?;
    send(&cluster, 2, 3, "H").await?;
    wait_red(handle(&cluster, 3)?).await?;
    send(&cluster, 3, 1, "I").await?;
    send(&cluster, 3, 2, "J").await?;
    send(&cluster, 1, 3, "K").await?;

    report(cluster, output).await
}
