use bincode::{deserialize, serialize};
use clap::{Parser, ValueEnum};
use server::utils::get_timestamp;
use shared::{GameSnapshot, InputState, MovementState, Packet, Role, Vec2, Vec3, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Headless client that creates or joins a room and prints what the server sends.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,
    /// Join an existing room instead of creating one
    #[clap(short, long)]
    join: Option<String>,
    /// Level to create a room on
    #[clap(short, long, default_value = "demo")]
    level: String,
    /// Preferred role when joining
    #[clap(short, long, value_enum)]
    role: Option<RoleArg>,
    /// How many seconds to stay in the room
    #[clap(short, long, default_value = "10")]
    duration: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    Strength,
    Scout,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Strength => Role::Strength,
            RoleArg::Scout => Role::Scout,
        }
    }
}

async fn send(socket: &UdpSocket, packet: &Packet, server: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, server).await?;
    Ok(())
}

fn own_position(snapshot: &GameSnapshot, role: Role) -> Option<Vec3> {
    snapshot
        .entities
        .iter()
        .find(|entity| entity.role == role)
        .map(|entity| entity.position)
}

fn describe(packet: &Packet) -> String {
    match packet {
        Packet::StateUpdate { snapshot } => format!(
            "state tick={} entities={} pings={}",
            snapshot.tick,
            snapshot.entities.len(),
            snapshot.pings.len()
        ),
        other => format!("{:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    println!("Sending connection request to {}", args.server);
    send(
        &socket,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
            resume: None,
        },
        args.server,
    )
    .await?;

    let mut buf = vec![0u8; 65536];
    let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf)).await??;
    let client_id = match deserialize::<Packet>(&buf[..len])? {
        Packet::Connected { client_id, .. } => client_id,
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    };
    println!("Connection accepted with client ID: {}", client_id);

    let request = match &args.join {
        Some(code) => Packet::JoinRoom {
            code: code.clone(),
            preferred_role: args.role.map(Role::from),
        },
        None => Packet::CreateRoom {
            level_id: args.level.clone(),
        },
    };
    send(&socket, &request, args.server).await?;

    let mut role: Option<Role> = None;
    let mut position: Option<Vec3> = None;
    let mut tick = 0u64;

    for i in 0..args.duration {
        send(
            &socket,
            &Packet::Heartbeat {
                timestamp: get_timestamp(),
            },
            args.server,
        )
        .await?;

        if let Some(current) = position {
            let step = Vec2::new((i as f32 / 5.0).sin() * 0.5, (i as f32 / 5.0).cos() * 0.5);
            let next = Vec3::new(current.x + step.x, current.y + step.y, current.z);
            tick += 1;
            let input = InputState {
                velocity: step,
                movement: MovementState::Walking,
                ..InputState::default()
            };
            send(
                &socket,
                &Packet::Input {
                    tick,
                    input,
                    position: next,
                },
                args.server,
            )
            .await?;
            position = Some(next);
        }

        // Drain whatever arrived during the last second
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while let Ok(Ok((len, _))) =
            tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await
        {
            match deserialize::<Packet>(&buf[..len]) {
                Ok(packet) => {
                    match &packet {
                        Packet::RoomCreated { role: assigned, .. } => role = Some(*assigned),
                        Packet::RoomJoined {
                            role: assigned,
                            snapshot,
                            ..
                        } => {
                            role = Some(*assigned);
                            position = own_position(snapshot, *assigned);
                        }
                        Packet::GameStarted { snapshot } => {
                            position = role.and_then(|r| own_position(snapshot, r));
                        }
                        _ => {}
                    }
                    if let Packet::StateUpdate { snapshot } = &packet {
                        if snapshot.tick % 20 != 0 {
                            continue;
                        }
                    }
                    println!("Received: {}", describe(&packet));
                }
                Err(e) => println!("Failed to deserialize packet: {}", e),
            }
        }
    }

    println!("Sending disconnect request");
    send(&socket, &Packet::Disconnect, args.server).await?;
    sleep(Duration::from_millis(100)).await;

    println!("Test client finished");
    Ok(())
}
