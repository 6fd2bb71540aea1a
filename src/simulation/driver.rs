use log::{error, info};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Room;
use crate::simulation::generator::{GeneratorSettings, run_generator};
use crate::simulation::sender::Transport;

/// Run one generator per room until all finish or `cancel` fires.
///
/// Returns the number of readings each room attempted, in completion order.
pub async fn run_simulation<T>(
    transport: Arc<T>,
    rooms: &[Room],
    settings: GeneratorSettings,
    cancel: CancellationToken,
) -> Vec<(Room, u64)>
where
    T: Transport + 'static,
{
    info!("Starting simulation for {} room(s)", rooms.len());

    let mut generators = JoinSet::new();
    for room in rooms.iter().cloned() {
        let transport = Arc::clone(&transport);
        let settings = settings.clone();
        // Child token: cancelling the driver reaches every generator.
        let cancel = cancel.child_token();
        generators.spawn(async move {
            let sent = run_generator(transport.as_ref(), &room, &settings, &cancel).await;
            (room, sent)
        });
    }

    let mut finished = Vec::with_capacity(rooms.len());
    while let Some(joined) = generators.join_next().await {
        match joined {
            Ok(result) => finished.push(result),
            Err(e) => error!("Generator task failed: {}", e),
        }
    }

    info!("Simulation finished");
    finished
}
