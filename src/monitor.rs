use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    context::AppContext,
    sensors::{evaluate, SensorSnapshot},
};

/// Watches the sensors of a fixed set of rooms, caches every snapshot and
/// raises alerts from it.
pub struct SensorMonitor {
    ctx: AppContext,
    rooms: Vec<String>,
}

impl SensorMonitor {
    pub fn new(ctx: AppContext, rooms: Vec<String>) -> Self {
        Self { ctx, rooms }
    }

    /// Runs until `shutdown` fires or every room's stream has ended.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self, shutdown: CancellationToken) {
        let (tx, mut rx) = mpsc::unbounded_channel::<SensorSnapshot>();

        let mut subscriptions = Vec::with_capacity(self.rooms.len());
        for room_id in &self.rooms {
            let tx = tx.clone();
            let failed_room = room_id.clone();
            let subscribed = self
                .ctx
                .gateway
                .subscribe(
                    room_id,
                    move |snapshot| {
                        let _ = tx.send(snapshot);
                    },
                    move |e| {
                        error!(room_id = %failed_room, error = %e, "Monitoring stopped for room");
                    },
                )
                .await;

            match subscribed {
                Ok(sub) => subscriptions.push(sub),
                Err(e) => error!(room_id = %room_id, error = %e, "Failed to monitor room"),
            }
        }
        drop(tx);

        info!(rooms = subscriptions.len(), "Sensor monitor started");

        loop {
            let snapshot = tokio::select! {
                _ = shutdown.cancelled() => break,
                snapshot = rx.recv() => match snapshot {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };
            self.handle(snapshot).await;
        }

        for sub in &subscriptions {
            sub.unsubscribe();
        }
        info!("Sensor monitor stopped");
    }

    async fn handle(&self, snapshot: SensorSnapshot) {
        let evaluation = evaluate(&snapshot);
        debug!(
            room_id = %snapshot.room_id,
            temperature_normal = evaluation.temperature_normal,
            humidity_normal = evaluation.humidity_normal,
            air_quality_normal = evaluation.air_quality_normal,
            "Snapshot evaluated"
        );

        self.ctx.cache.update(snapshot.clone()).await;

        if let Err(e) = self
            .ctx
            .alerts
            .evaluate_and_alert(&snapshot.room_id, &snapshot, None)
            .await
        {
            error!(room_id = %snapshot.room_id, error = %e, "Failed to record alerts");
        }
    }
}
