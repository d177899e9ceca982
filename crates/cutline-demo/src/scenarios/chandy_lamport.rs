use std::time::Duration;

use cutline::{Cluster, CutlineConfig};
use cutline_types::StrategyKind;

use super::{Output, report};

const STEP: Duration = Duration::from_millis(50);

pub async fn run(config: CutlineConfig, output: Output) -> Result<(), String> {
    let cluster = Cluster::complete(3, config.with_strategy(StrategyKind::Marker))
        .map_err(|e| e.to_string())?;

    for (from, to, payload) in [(1, 2, "A"), (2, 3, "B"), (3, 1, "C"), (2, 1, "D")] {
        cluster
            .send(from, to, payload)
            .await
            .map_err(|e| e.to_string())?;
        println!("P{from} -> P{to}: {payload}");
        tokio::time::sleep(STEP).await;
    }

    println!("--- P1 initiates snapshot ---");
    let p1 = cluster.handle(1).ok_or("P1 missing from cluster")?;
    p1.initiate_snapshot().await.map_err(|e| e.to_string())?;

    report(cluster, output).await
}
