use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Login {
        addr: String,
        username: String,
        password: String,
    },
    Join {
        channel: String,
    },
    Exit {
        channel: String,
    },
    Report {
        path: PathBuf,
    },
    Summary {
        game: String,
        user: String,
        output: PathBuf,
    },
    Logout,
}

/// Parses one line typed by the user. The error is the message to show.
pub fn parse(line: &str) -> Result<Option<UserCommand>, String> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = tokens.collect();
    let command = match verb {
        "login" => {
            let [host_port, username, password, ..] = args.as_slice() else {
                return Err("Usage: login <host:port> <username> <password>".to_string());
            };
            validate_host_port(host_port)?;
            UserCommand::Login {
                addr: host_port.to_string(),
                username: username.to_string(),
                password: password.to_string(),
            }
        }
        "join" => UserCommand::Join {
            channel: first_arg(&args, "Usage: join <channel>")?,
        },
        "exit" => UserCommand::Exit {
            channel: first_arg(&args, "Usage: exit <channel>")?,
        },
        "report" => UserCommand::Report {
            path: PathBuf::from(first_arg(&args, "Usage: report <file>")?),
        },
        "summary" => {
            let [game, user, output, ..] = args.as_slice() else {
                return Err("Usage: summary <game> <user> <file>".to_string());
            };
            UserCommand::Summary {
                game: game.to_string(),
                user: user.to_string(),
                output: PathBuf::from(*output),
            }
        }
        "logout" => UserCommand::Logout,
        _ => return Err("Illegal command".to_string()),
    };
    Ok(Some(command))
}

fn first_arg(args: &[&str], usage: &str) -> Result<String, String> {
    args.first()
        .map(|value| value.to_string())
        .ok_or_else(|| usage.to_string())
}

fn validate_host_port(value: &str) -> Result<(), String> {
    let Some((host, port)) = value.rsplit_once(':') else {
        return Err("Invalid host:port format".to_string());
    };
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err("Invalid host:port format".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_verb() {
        assert_eq!(
            parse("login 127.0.0.1:7777 alice pw").unwrap(),
            Some(UserCommand::Login {
                addr: "127.0.0.1:7777".to_string(),
                username: "alice".to_string(),
                password: "pw".to_string(),
            })
        );
        assert_eq!(
            parse("  join   Germany_Japan ").unwrap(),
            Some(UserCommand::Join {
                channel: "Germany_Japan".to_string()
            })
        );
        assert_eq!(
            parse("exit Germany_Japan").unwrap(),
            Some(UserCommand::Exit {
                channel: "Germany_Japan".to_string()
            })
        );
        assert_eq!(
            parse("report data/events.json").unwrap(),
            Some(UserCommand::Report {
                path: PathBuf::from("data/events.json")
            })
        );
        assert_eq!(
            parse("summary Germany_Japan bob out.txt").unwrap(),
            Some(UserCommand::Summary {
                game: "Germany_Japan".to_string(),
                user: "bob".to_string(),
                output: PathBuf::from("out.txt"),
            })
        );
        assert_eq!(parse("logout").unwrap(), Some(UserCommand::Logout));
    }

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn missing_arguments_yield_usage() {
        assert_eq!(parse("join").unwrap_err(), "Usage: join <channel>");
        assert_eq!(
            parse("summary g u").unwrap_err(),
            "Usage: summary <game> <user> <file>"
        );
        assert!(parse("login host:1 alice").unwrap_err().starts_with("Usage: login"));
    }

    #[test]
    fn bad_host_port_is_rejected() {
        assert_eq!(
            parse("login localhost alice pw").unwrap_err(),
            "Invalid host:port format"
        );
        assert_eq!(
            parse("login localhost:notaport alice pw").unwrap_err(),
            "Invalid host:port format"
        );
    }

    #[test]
    fn unknown_verb_is_illegal() {
        assert_eq!(parse("dance now").unwrap_err(), "Illegal command");
    }
}
