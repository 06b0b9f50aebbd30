mod client;
mod config;
mod game;
mod game_modes;
mod host;
mod logging;
mod network;
mod utils;

use game_modes::PlayOptions;

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Host { username: String },
    Play(PlayOptions),
}

#[derive(Debug, Clone, PartialEq)]
struct Args {
    mode: Mode,
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("archers");

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage(program);
        return Ok(());
    }

    let parsed = match parse_args(args.get(1..).unwrap_or_default()) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("Error: {}", message);
            print_usage(program);
            std::process::exit(1);
        }
    };

    let config = config::load_config()?;
    logging::init(&config.logging, parsed.debug)?;
    if parsed.debug {
        println!("Debug log: {}", config.logging.debug_log_path);
    }

    match parsed.mode {
        Mode::Host { username } => game_modes::run_host(config, username).await,
        Mode::Play(options) => game_modes::run_play(config, options).await,
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let Some(command) = args.first() else {
        return Err("missing command".to_string());
    };

    let mut username = None;
    let mut server = None;
    let mut room = None;
    let mut debug = false;

    let mut rest = args[1..].iter();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--name" | "-n" => username = Some(flag_value(flag, rest.next())?),
            "--server" | "-s" => server = Some(flag_value(flag, rest.next())?),
            "--room" | "-r" => room = Some(flag_value(flag, rest.next())?),
            "--debug" => debug = true,
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    let username = username.ok_or_else(|| "--name is required".to_string())?;

    let mode = match command.as_str() {
        "host" => {
            if server.is_some() || room.is_some() {
                return Err("--server and --room only apply to play".to_string());
            }
            Mode::Host { username }
        }
        "play" => Mode::Play(PlayOptions {
            username,
            server,
            room,
        }),
        other => return Err(format!("unknown command: {}", other)),
    };

    Ok(Args { mode, debug })
}

fn flag_value(flag: &str, value: Option<&String>) -> Result<String, String> {
    value
        .cloned()
        .ok_or_else(|| format!("{} requires a value", flag))
}

fn print_usage(program: &str) {
    println!("Archers - archers vs. zombies host and player");
    println!();
    println!("Usage:");
    println!(
        "  {} host --name <user> [--debug]                         # Host rooms until Ctrl-C",
        program
    );
    println!(
        "  {} play --name <user> [--server <id>] [--room <id>]     # Join a game",
        program
    );
    println!();
    println!("Without --server, play joins the first host that answers discovery.");
    println!("Without --room, play opens a new room.");
    println!();
    println!("The relay must be running: cargo run --bin relay");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_host() {
        let parsed = parse_args(&args(&["host", "--name", "robin", "--debug"])).unwrap();
        assert_eq!(
            parsed,
            Args {
                mode: Mode::Host {
                    username: "robin".to_string()
                },
                debug: true,
            }
        );
    }

    #[test]
    fn test_parse_play_with_target() {
        let parsed =
            parse_args(&args(&["play", "-n", "ann", "--server", "s-1", "--room", "r-1"])).unwrap();
        assert_eq!(
            parsed.mode,
            Mode::Play(PlayOptions {
                username: "ann".to_string(),
                server: Some("s-1".to_string()),
                room: Some("r-1".to_string()),
            })
        );
        assert!(!parsed.debug);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["play"])).is_err());
        assert!(parse_args(&args(&["play", "--name"])).is_err());
        assert!(parse_args(&args(&["fly", "--name", "x"])).is_err());
        assert!(parse_args(&args(&["host", "--name", "x", "--room", "r"])).is_err());
    }
}
