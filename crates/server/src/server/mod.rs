//! WebSocket listener.

use crate::config::{Config, PersistenceConfig, TransportConfig};
use crate::persistence::{HttpPersistence, NullPersistence, Persistence};
use crate::transport::Connection;
use crate::world::World;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{error, info};

/// Run the game server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    let world = World::new(&config, persistence(&config.persistence)?);
    serve(listener, world, config.transport).await
}

/// Pick the store client for `config`.
pub fn persistence(config: &PersistenceConfig) -> anyhow::Result<Arc<dyn Persistence>> {
    match &config.base_url {
        Some(url) => {
            info!("Persisting scores to {}", url);
            Ok(Arc::new(HttpPersistence::new(url.as_str(), config.timeout())?))
        }
        None => {
            info!("No persistence configured, scores are not saved");
            Ok(Arc::new(NullPersistence))
        }
    }
}

/// Accept connections on `listener` forever.
pub async fn serve(
    listener: TcpListener,
    world: Arc<World>,
    transport: TransportConfig,
) -> anyhow::Result<()> {
    let transport = Arc::new(transport);
    loop {
        let (stream, addr) = listener.accept().await?;
        let world = Arc::clone(&world);
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, world, &transport).await {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    world: Arc<World>,
    transport: &TransportConfig,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let connection_id = world.next_connection_id();
    info!("New connection {} from {}", connection_id, addr);

    // Registered before the first frame is read so a Join always finds it.
    let (conn, pump) = Connection::open(connection_id, ws_stream, transport);
    world.accept(conn.id(), conn.clone());

    let handler = Arc::clone(&world);
    pump.start(move |frame| {
        let world = Arc::clone(&handler);
        async move { world.handle_frame(connection_id, frame).await }
    });

    conn.closed().await;
    world.disconnect(connection_id).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use protocol::{Color, Event, Operation, PlayerId};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    async fn start() -> (SocketAddr, Arc<World>) {
        let mut config = Config::default();
        config.world.food_count = 5;
        config.bots.enabled = false;
        let world = World::new(&config, Arc::new(NullPersistence));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::clone(&world), config.transport));
        (addr, world)
    }

    #[tokio::test]
    async fn test_join_over_websocket() {
        let (addr, world) = start().await;
        let (mut client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let join = Operation::Join {
            player_id: PlayerId::from_u128(42),
            username: "Orion".into(),
            color: Color::new(10, 200, 30),
            skin: Some("earth".into()),
            game_id: None,
        };
        client.send(Message::Binary(join.encode())).await.unwrap();

        let mut events = Vec::new();
        while events.len() < 2 {
            match timeout(Duration::from_secs(2), client.next()).await.unwrap() {
                Some(Ok(Message::Binary(data))) => events.push(Event::decode(&data).unwrap()),
                Some(Ok(_)) => {}
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(events[0], Event::Joined { player_id, .. } if player_id == PlayerId::from_u128(42)));
        assert!(matches!(&events[1], Event::NewFood { food } if food.len() == 5));
        assert_eq!(world.player_count(), 1);

        client.close(None).await.unwrap();
        for _ in 0..50 {
            if world.player_count() == 0 && world.connection_count() == 0 {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("disconnect did not clean up: {:?}", world);
    }

    #[test]
    fn test_persistence_selection() {
        assert!(persistence(&PersistenceConfig::default()).is_ok());
        let config = PersistenceConfig {
            base_url: Some("http://127.0.0.1:3000".into()),
            timeout_ms: 100,
        };
        assert!(persistence(&config).is_ok());
    }
}
