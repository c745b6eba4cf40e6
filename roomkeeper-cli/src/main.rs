use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use roomkeeper_core::config::Config;
use roomkeeper_core::core_room::{
    with_creator, with_setting, ClientRegistry, ListQuery, Permission, RoomError, RoomId,
    RoomRole, RoomService, RoomSetting, SessionTokenIssuer, SqlRoomStore, UserId,
};
use roomkeeper_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use roomkeeper_core::metrics::init_metrics;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "roomkeeper")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the configuration
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage rooms
    ///
    /// Session tokens and connected-client counts live only inside this
    /// process. A token printed by `create --enter` or `enter` cannot be
    /// resolved by a later invocation, and `list`/`check` report peopleNum 0.
    #[command(subcommand)]
    Room(RoomCommand),

    /// Inspect and change member permissions
    #[command(subcommand)]
    Permission(PermissionCommand),
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user
    Add { username: String },
}

#[derive(Subcommand, Debug)]
enum RoomCommand {
    /// Create a room owned by an existing user
    Create {
        name: String,
        #[arg(long)]
        creator: String,
        #[arg(long, default_value = "")]
        password: String,
        #[arg(long)]
        hidden: bool,
        /// Also print a session token for the creator (valid only within this process)
        #[arg(long)]
        enter: bool,
    },

    /// List visible rooms (peopleNum is 0 without a live runtime)
    List {
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        order: Option<String>,
        #[arg(long)]
        page: Option<String>,
        #[arg(long)]
        max: Option<String>,
    },

    /// Show whether a password is required (peopleNum is 0 without a live runtime)
    Check { room: i64 },

    /// Verify a password; the printed token is valid only within this process
    Enter {
        room: i64,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        password: String,
    },

    /// Replace the room password; empty clears it
    Password {
        room: i64,
        #[arg(long, default_value = "")]
        password: String,
    },

    /// Show or change room settings
    Setting {
        room: i64,
        #[arg(long)]
        hidden: Option<bool>,
    },

    /// Give a user the Member or Admin role
    Grant {
        room: i64,
        user: String,
        role: String,
    },

    /// Remove a non-creator member
    Revoke { room: i64, user: String },

    /// List the members of a room
    Members { room: i64 },

    /// Delete a room and all of its memberships
    Delete { room: i64 },
}

#[derive(Subcommand, Debug)]
enum PermissionCommand {
    /// Replace a member's permission mask (names separated by commas, or a number)
    Set {
        room: i64,
        user: String,
        permissions: String,
    },

    /// Check whether a member holds a permission
    Check {
        room: i64,
        user: String,
        permission: String,
    },
}

fn load_config<F>(args: &Args, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &args.config {
        Some(path) => Config::from_file_and_lookup(path, lookup)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::from_lookup(lookup)?,
    };

    if let Some(path) = &args.database {
        config.store.database_path = path.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

fn build_service(config: &Config) -> Result<RoomService> {
    let store = SqlRoomStore::open(&config.store)?;
    let issuer = match config.session.token_ttl {
        Some(ttl) => SessionTokenIssuer::with_ttl(ttl),
        None => SessionTokenIssuer::new(),
    };

    Ok(RoomService::new(
        store,
        Arc::new(ClientRegistry::new()),
        Arc::new(issuer),
        config.listing.clone(),
    ))
}

async fn resolve_user(service: &RoomService, username: &str) -> Result<UserId, RoomError> {
    service
        .find_user(username.to_string())
        .await?
        .map(|user| user.id)
        .ok_or(RoomError::RelationNotFound)
}

fn parse_permission(raw: &str) -> Result<Permission, RoomError> {
    Permission::parse_list(raw)
        .ok_or_else(|| RoomError::bad_request(format!("unknown permission: {}", raw)))
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, RoomError> {
    serde_json::to_value(value).map_err(|e| RoomError::internal(e.to_string()))
}

async fn run(service: &RoomService, command: Command) -> Result<serde_json::Value, RoomError> {
    match command {
        Command::User(UserCommand::Add { username }) => to_json(&service.create_user(username).await?),

        Command::Room(command) => run_room(service, command).await,

        Command::Permission(PermissionCommand::Set {
            room,
            user,
            permissions,
        }) => {
            let user_id = resolve_user(service, &user).await?;
            let mask = parse_permission(&permissions)?;
            service.change_permission(RoomId(room), user_id, mask).await?;
            Ok(json!({ "permissions": mask.names() }))
        }

        Command::Permission(PermissionCommand::Check {
            room,
            user,
            permission,
        }) => {
            let user_id = resolve_user(service, &user).await?;
            let bit = parse_permission(&permission)?;
            let allowed = service.check_permission(RoomId(room), user_id, bit).await?;
            Ok(json!({ "allowed": allowed }))
        }
    }
}

async fn run_room(service: &RoomService, command: RoomCommand) -> Result<serde_json::Value, RoomError> {
    match command {
        RoomCommand::Create {
            name,
            creator,
            password,
            hidden,
            enter,
        } => {
            let creator_id = resolve_user(service, &creator).await?;
            let setting = RoomSetting { hidden };
            if enter {
                to_json(
                    &service
                        .create_room_and_enter(creator_id, name, password, setting)
                        .await?,
                )
            } else {
                let room = service
                    .create_room(name, password, vec![with_creator(creator_id), with_setting(setting)])
                    .await?;
                to_json(&room)
            }
        }

        RoomCommand::List {
            sort,
            order,
            page,
            max,
        } => {
            let query = ListQuery::parse(
                sort.as_deref(),
                order.as_deref(),
                page.as_deref(),
                max.as_deref(),
                service.directory().config(),
            )?;
            to_json(&service.list_rooms(query).await?)
        }

        RoomCommand::Check { room } => to_json(&service.check_room(RoomId(room)).await?),

        RoomCommand::Enter {
            room,
            user,
            password,
        } => {
            let user_id = resolve_user(service, &user).await?;
            to_json(&service.enter_room(user_id, RoomId(room), password).await?)
        }

        RoomCommand::Password { room, password } => {
            let need_password = !password.is_empty();
            service.set_password(RoomId(room), password).await?;
            Ok(json!({ "needPassword": need_password }))
        }

        RoomCommand::Setting { room, hidden } => {
            if let Some(hidden) = hidden {
                service
                    .change_setting(RoomId(room), RoomSetting { hidden })
                    .await?;
            }
            to_json(&service.room_setting(RoomId(room)).await?)
        }

        RoomCommand::Grant { room, user, role } => {
            let role: RoomRole = role.parse().map_err(RoomError::BadRequest)?;
            let user_id = resolve_user(service, &user).await?;
            to_json(&service.grant_role(RoomId(room), user_id, role).await?)
        }

        RoomCommand::Revoke { room, user } => {
            let user_id = resolve_user(service, &user).await?;
            service.revoke_member(RoomId(room), user_id).await?;
            Ok(json!({ "revoked": user }))
        }

        RoomCommand::Members { room } => to_json(&service.list_members(RoomId(room)).await?),

        RoomCommand::Delete { room } => {
            service.delete_room(RoomId(room)).await?;
            Ok(json!({ "deleted": room }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args, |key| std::env::var(key).ok())?;

    let log_config = LogConfig::try_from(&config.logging).unwrap_or_else(|e| {
        eprintln!("{}, using 'info'", e);
        LogConfig::new(LogLevel::Info)
    });
    init_logging_with_config(log_config)?;
    init_metrics();

    debug!(database = %config.store.database_path.display(), "Opening room store");
    let service = build_service(&config)?;

    match run(&service, args.command).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            info!("Command finished");
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.payload())?);
            let status = err.status_code();
            Err(anyhow!(err).context(format!("request failed with status {}", status)))
        }
    }
}
