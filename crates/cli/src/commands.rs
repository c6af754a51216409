//! Command parsing and execution

use std::fmt::Write;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use deck_core::resource::{PreferenceField, PreferenceUpdate, ResourceId, Urgency};
use deck_core::store::LocalStore;
use deck_core::sync::SyncReport;

use crate::config::Config;
use crate::session::Session;

pub const USAGE: &str = "\
usage: deck <command> [args]

board:
  show
  add-card <name>
  remove-card <card>
  rename-card <card> <name>
  move-card <from> <to>
  add-task <card> <description>
  remove-task <card> <index>
  move-task <card> <from> <to>
  edit-task <card> <index> <description>
  transfer-task <from-card> <to-card> <from> <to>
  set-pref <card> <warning_time|danger_time|show_date> <value>

account:
  login <username> <password>
  register <email> <username> <password>
  logout

sync:
  pull [--force]
  sync
  wipe
";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Show,
    AddCard {
        name: String,
    },
    RemoveCard {
        card: ResourceId,
    },
    RenameCard {
        card: ResourceId,
        name: String,
    },
    MoveCard {
        from: usize,
        to: usize,
    },
    AddTask {
        card: ResourceId,
        description: String,
    },
    RemoveTask {
        card: ResourceId,
        index: usize,
    },
    MoveTask {
        card: ResourceId,
        from: usize,
        to: usize,
    },
    EditTask {
        card: ResourceId,
        index: usize,
        description: String,
    },
    TransferTask {
        from_card: ResourceId,
        to_card: ResourceId,
        from: usize,
        to: usize,
    },
    SetPref {
        card: ResourceId,
        update: PreferenceUpdate,
    },
    Login {
        username: String,
        password: String,
    },
    Register {
        email: String,
        username: String,
        password: String,
    },
    Logout,
    Pull {
        force: bool,
    },
    Sync,
    Wipe,
}

fn parse_id(raw: &str) -> anyhow::Result<ResourceId> {
    raw.parse::<u64>()
        .ok()
        .and_then(ResourceId::new)
        .with_context(|| format!("Invalid id: {}", raw))
}

fn parse_index(raw: &str) -> anyhow::Result<usize> {
    raw.parse::<usize>()
        .with_context(|| format!("Invalid index: {}", raw))
}

fn text(words: &[&str]) -> String {
    words.join(" ")
}

impl Command {
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Self::Help);
        };
        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

        let command = match (name.as_str(), rest.as_slice()) {
            ("help" | "--help" | "-h", _) => Self::Help,
            ("show", []) => Self::Show,
            ("add-card", words) if !words.is_empty() => Self::AddCard { name: text(words) },
            ("remove-card", [card]) => Self::RemoveCard {
                card: parse_id(card)?,
            },
            ("rename-card", [card, words @ ..]) if !words.is_empty() => Self::RenameCard {
                card: parse_id(card)?,
                name: text(words),
            },
            ("move-card", [from, to]) => Self::MoveCard {
                from: parse_index(from)?,
                to: parse_index(to)?,
            },
            ("add-task", [card, words @ ..]) if !words.is_empty() => Self::AddTask {
                card: parse_id(card)?,
                description: text(words),
            },
            ("remove-task", [card, index]) => Self::RemoveTask {
                card: parse_id(card)?,
                index: parse_index(index)?,
            },
            ("move-task", [card, from, to]) => Self::MoveTask {
                card: parse_id(card)?,
                from: parse_index(from)?,
                to: parse_index(to)?,
            },
            ("edit-task", [card, index, words @ ..]) if !words.is_empty() => Self::EditTask {
                card: parse_id(card)?,
                index: parse_index(index)?,
                description: text(words),
            },
            ("transfer-task", [from_card, to_card, from, to]) => Self::TransferTask {
                from_card: parse_id(from_card)?,
                to_card: parse_id(to_card)?,
                from: parse_index(from)?,
                to: parse_index(to)?,
            },
            ("set-pref", [card, field, value]) => {
                let field: PreferenceField = field.parse()?;
                Self::SetPref {
                    card: parse_id(card)?,
                    update: PreferenceUpdate::parse(field, value)?,
                }
            }
            ("login", [username, password]) => Self::Login {
                username: username.to_string(),
                password: password.to_string(),
            },
            ("register", [email, username, password]) => Self::Register {
                email: email.to_string(),
                username: username.to_string(),
                password: password.to_string(),
            },
            ("logout", []) => Self::Logout,
            ("pull", []) => Self::Pull { force: false },
            ("pull", ["--force"]) => Self::Pull { force: true },
            ("sync", []) => Self::Sync,
            ("wipe", []) => Self::Wipe,
            (other, _) => bail!("Unknown command or wrong arguments: {} (see `deck help`)", other),
        };
        Ok(command)
    }

    /// Whether the command changes the board
    pub fn edits_board(&self) -> bool {
        matches!(
            self,
            Self::AddCard { .. }
                | Self::RemoveCard { .. }
                | Self::RenameCard { .. }
                | Self::MoveCard { .. }
                | Self::AddTask { .. }
                | Self::RemoveTask { .. }
                | Self::MoveTask { .. }
                | Self::EditTask { .. }
                | Self::TransferTask { .. }
                | Self::SetPref { .. }
        )
    }
}

pub async fn execute(command: Command, session: &mut Session, config: &Config) -> anyhow::Result<()> {
    let edits_board = command.edits_board();

    match command {
        Command::Help => print!("{}", USAGE),
        Command::Show => print!("{}", render(session.store(), Utc::now())?),
        Command::AddCard { name } => {
            let card = session.store_mut().add_card(name);
            println!("Added card {}", card);
        }
        Command::RemoveCard { card } => {
            let removed = session.store_mut().remove_card(card)?;
            println!("Removed card {} ({})", removed.id, removed.name);
        }
        Command::RenameCard { card, name } => session.store_mut().rename_card(card, name)?,
        Command::MoveCard { from, to } => session.store_mut().move_card(from, to)?,
        Command::AddTask { card, description } => {
            let task = session.store_mut().add_task(card, description)?;
            println!("Added task {}", task);
        }
        Command::RemoveTask { card, index } => {
            let removed = session.store_mut().remove_task(card, index)?;
            println!("Removed task {} ({})", removed.id, removed.description);
        }
        Command::MoveTask { card, from, to } => session.store_mut().move_task(card, from, to)?,
        Command::EditTask {
            card,
            index,
            description,
        } => session.store_mut().update_task(card, index, description)?,
        Command::TransferTask {
            from_card,
            to_card,
            from,
            to,
        } => session
            .store_mut()
            .transfer_task(from_card, to_card, from, to)?,
        Command::SetPref { card, update } => session.store_mut().set_preference_field(card, update)?,
        Command::Login { username, password } => {
            session.login(&username, &password).await?;
            println!("Logged in as {}", username);
        }
        Command::Register {
            email,
            username,
            password,
        } => {
            session.register(&email, &username, &password).await?;
            println!("Registered {}; run `deck login` to sign in", username);
        }
        Command::Logout => {
            session.logout().await?;
            println!("Logged out");
        }
        Command::Pull { force } => {
            session.pull(force).await?;
            println!("Pulled {} cards from the server", session.store().cards().len());
        }
        Command::Sync => print_report(&session.sync().await?),
        Command::Wipe => {
            session.wipe().await?;
            println!("Local data wiped");
        }
    }

    if edits_board {
        session.save().await.context("Failed to save local changes")?;
        if config.auto_sync {
            print_report(&session.sync().await?);
        }
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.calls == 0 {
        println!("Already in sync");
    } else {
        println!(
            "Synced {} changes in {} calls",
            report.changes(),
            report.calls
        );
    }
    if !report.store_clean {
        println!("Some edits arrived during the sync and are still pending");
    }
}

fn urgency_marker(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Normal => "  ",
        Urgency::Warning => "! ",
        Urgency::Danger => "!!",
    }
}

/// Plain-text board listing
pub fn render(store: &LocalStore, now: DateTime<Utc>) -> anyhow::Result<String> {
    let mut out = String::new();
    if store.cards().is_empty() {
        writeln!(out, "No cards yet")?;
    }

    for card in store.cards() {
        writeln!(out, "[{}] {}", card.id, card.name)?;
        let preference = store.get_preference(card.id)?;
        for (index, task) in store.tasks(card.id)?.iter().enumerate() {
            let marker = urgency_marker(preference.urgency(task, now));
            if preference.show_date {
                writeln!(
                    out,
                    "  {} {}. {} ({})",
                    marker,
                    index,
                    task.description,
                    task.created_at().format("%Y-%m-%d")
                )?;
            } else {
                writeln!(out, "  {} {}. {}", marker, index, task.description)?;
            }
        }
    }

    if let Some(token) = store.token() {
        if !token.is_empty() {
            writeln!(out, "(logged in)")?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn id(raw: u64) -> ResourceId {
        ResourceId::new(raw).unwrap()
    }

    #[test]
    fn test_parse_board_commands() {
        assert_eq!(Command::parse(&args(&[])).unwrap(), Command::Help);
        assert_eq!(
            Command::parse(&args(&["add-card", "Weekly", "review"])).unwrap(),
            Command::AddCard {
                name: "Weekly review".to_string()
            }
        );
        assert_eq!(
            Command::parse(&args(&["transfer-task", "1", "2", "0", "3"])).unwrap(),
            Command::TransferTask {
                from_card: id(1),
                to_card: id(2),
                from: 0,
                to: 3,
            }
        );
        assert_eq!(
            Command::parse(&args(&["set-pref", "4", "warning_time", "3600"])).unwrap(),
            Command::SetPref {
                card: id(4),
                update: PreferenceUpdate::WarningTime(Some(Duration::from_secs(3600))),
            }
        );
        assert_eq!(Command::parse(&args(&["pull"])).unwrap(), Command::Pull { force: false });
        assert_eq!(
            Command::parse(&args(&["pull", "--force"])).unwrap(),
            Command::Pull { force: true }
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Command::parse(&args(&["remove-card", "0"])).is_err());
        assert!(Command::parse(&args(&["move-task", "1", "x", "2"])).is_err());
        assert!(Command::parse(&args(&["add-card"])).is_err());
        assert!(Command::parse(&args(&["frobnicate"])).is_err());
        assert!(Command::parse(&args(&["pull", "--hard"])).is_err());

        let err = Command::parse(&args(&["set-pref", "1", "colour", "red"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<deck_core::Error>(),
            Some(deck_core::Error::UnknownPreferenceField(_))
        ));
    }

    #[test]
    fn test_edits_board() {
        assert!(Command::AddCard { name: "a".into() }.edits_board());
        assert!(!Command::Show.edits_board());
        assert!(!Command::Sync.edits_board());
        assert!(!Command::Login {
            username: "a".into(),
            password: "b".into()
        }
        .edits_board());
    }

    #[test]
    fn test_render() {
        let mut store = LocalStore::new();
        assert_eq!(render(&store, Utc::now()).unwrap(), "No cards yet\n");

        let card = store.add_card("Work");
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        store.add_task(card, "Old").unwrap();
        store.add_task(card, "Fresh").unwrap();

        // Backdate the first task through a snapshot round trip
        let mut snapshot = store.snapshot();
        snapshot.tasks[0] = snapshot.tasks[0].clone().with_created_at(created);
        snapshot.tasks[1] = snapshot.tasks[1].clone().with_created_at(created + chrono::Duration::days(2));
        let mut store = LocalStore::from_snapshot(snapshot).unwrap();

        store
            .set_preference_field(card, PreferenceUpdate::WarningTime(Some(Duration::from_secs(86_400))))
            .unwrap();
        store
            .set_preference_field(card, PreferenceUpdate::ShowDate(true))
            .unwrap();

        let now = created + chrono::Duration::days(3) - chrono::Duration::hours(1);
        let output = render(&store, now).unwrap();
        assert_eq!(
            output,
            "[1] Work\n  !  0. Old (2024-03-01)\n     1. Fresh (2024-03-03)\n"
        );
    }
}
