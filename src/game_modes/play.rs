// Line-oriented player: discovers a host, joins a room and reads commands from stdin

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::{ClientEvent, GameClient};
use crate::config::Config;
use crate::network::protocol::GridPoint;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayOptions {
    pub username: String,
    pub server: Option<String>,
    pub room: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayCommand {
    Start,
    Shoot(GridPoint),
    Leave,
    Quit,
}

pub fn parse_command(line: &str) -> Result<PlayCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["start"] => Ok(PlayCommand::Start),
        ["shoot", x, y] => {
            let x = x.parse().map_err(|_| format!("bad x coordinate: {}", x))?;
            let y = y.parse().map_err(|_| format!("bad y coordinate: {}", y))?;
            Ok(PlayCommand::Shoot(GridPoint::new(x, y)))
        }
        ["leave"] => Ok(PlayCommand::Leave),
        ["quit"] | ["exit"] => Ok(PlayCommand::Quit),
        _ => Err(format!("unknown command: {}", line.trim())),
    }
}

/// One line per event; `None` for events not worth printing
pub fn describe_event(event: &ClientEvent) -> Option<String> {
    let line = match event {
        ClientEvent::ConnectionSuccess => "Connected".to_string(),
        ClientEvent::ConnectionError(reason) => format!("Connection problem: {}", reason),
        ClientEvent::ServerDiscovered(_) => return None,
        ClientEvent::OtherUserJoined { username, .. } => format!("{} joined", username),
        ClientEvent::OtherUserLeft { client_id } => format!("{} left", client_id),
        ClientEvent::MapChanged(room) => {
            let alive = room.zombies.iter().filter(|z| !z.is_dead()).count();
            let closest = room
                .zombies
                .iter()
                .filter(|z| !z.is_dead())
                .map(|z| z.x)
                .min();
            match closest {
                Some(x) => format!(
                    "Tick {}: {} zombies, closest at x={}",
                    room.total_ticks, alive, x
                ),
                None => format!("Tick {}: no zombies", room.total_ticks),
            }
        }
        ClientEvent::UserShot {
            shooter_client_id,
            point,
            zombie_id,
            is_killed,
        } => match (zombie_id, is_killed) {
            (Some(id), Some(true)) => format!(
                "{} killed zombie {} at ({}, {})",
                shooter_client_id, id, point.x, point.y
            ),
            (Some(id), _) => format!(
                "{} hit zombie {} at ({}, {})",
                shooter_client_id, id, point.x, point.y
            ),
            _ => format!("{} missed at ({}, {})", shooter_client_id, point.x, point.y),
        },
        ClientEvent::GameOver { reason } => format!("Game over: {}", reason),
    };
    Some(line)
}

pub async fn run_play(config: Config, options: PlayOptions) -> Result<()> {
    let mut client = GameClient::new(&config, options.username.clone());
    println!("Connecting to relay {}", config.network.relay_url);
    client.start().await?;

    let server_id = match options.server {
        Some(server_id) => server_id,
        None => {
            let servers = client.discover_servers().await?;
            let mut servers: Vec<_> = servers.into_values().collect();
            servers.sort_by(|a, b| a.host_username.cmp(&b.host_username));
            for server in &servers {
                println!(
                    "Found {} ({}) with {} rooms",
                    server.host_username,
                    server.server_id,
                    server.rooms.len()
                );
            }
            match servers.into_iter().next() {
                Some(server) => server.server_id,
                None => bail!("No servers answered discovery"),
            }
        }
    };

    let room_id = match options.room {
        Some(room_id) => {
            client.join_room(&server_id, &room_id)?;
            room_id
        }
        None => client.join_new_room(&server_id)?,
    };
    println!("Joining room {} on {}", room_id, server_id);
    println!("Commands: start | shoot X Y | leave | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let sent = match parse_command(&line) {
                    Ok(PlayCommand::Start) => client.start_game(),
                    Ok(PlayCommand::Shoot(point)) => client.shoot(point),
                    Ok(PlayCommand::Leave) => {
                        client.leave_room()?;
                        break;
                    }
                    Ok(PlayCommand::Quit) => break,
                    Err(message) => {
                        println!("{}", message);
                        continue;
                    }
                };
                if let Err(e) = sent {
                    println!("Error: {}", e);
                }
            }
            event = client.next_event() => {
                let Some(event) = event else { break };
                if let Some(line) = describe_event(&event) {
                    println!("{}", line);
                }
                if matches!(event, ClientEvent::GameOver { .. }) {
                    break;
                }
            }
        }
    }

    Ok(())
}
