use crate::output::{print_json, print_table};
use anyhow::Context;
use archetype_core::user::{FileUserStore, Role, UserId, UserStore};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum UserSubcommand {
    /// Create a user
    Create {
        login: String,
        email: String,
        /// administrator or subscriber
        #[arg(long, default_value = "subscriber")]
        role: String,
    },

    /// List all users
    List,

    /// Show one user with their metadata
    Show { id: UserId },

    /// Read or write user metadata
    Meta {
        #[command(subcommand)]
        subcommand: MetaSubcommand,
    },
}

#[derive(Subcommand)]
pub enum MetaSubcommand {
    /// Print a metadata value
    Get { id: UserId, key: String },

    /// Set a metadata value
    Set {
        id: UserId,
        key: String,
        value: String,
    },
}

pub fn run(root: &Path, subcmd: UserSubcommand, json: bool) -> anyhow::Result<()> {
    let store = FileUserStore::open(root);
    match subcmd {
        UserSubcommand::Create { login, email, role } => {
            let role: Role = role.parse()?;
            let record = store
                .create(&login, &email, role)
                .with_context(|| format!("failed to create user '{login}'"))?;
            if json {
                print_json(&record)?;
            } else {
                println!("Created user {} ({})", record.id, record.login);
            }
        }

        UserSubcommand::List => {
            let users = store.list()?;
            if json {
                return print_json(&users);
            }
            if users.is_empty() {
                println!("No users.");
                return Ok(());
            }
            let rows = users
                .iter()
                .map(|u| {
                    vec![
                        u.id.to_string(),
                        u.login.clone(),
                        u.email.clone(),
                        u.role.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "LOGIN", "EMAIL", "ROLE"], rows);
        }

        UserSubcommand::Show { id } => {
            let user = store.user(id)?;
            if json {
                return print_json(&user);
            }
            println!("User:    {} ({})", user.id, user.login);
            println!("Email:   {}", user.email);
            println!("Role:    {}", user.role);
            println!("Created: {}", user.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if !user.meta.is_empty() {
                println!();
                for (key, value) in &user.meta {
                    println!("  {key} = {value}");
                }
            }
        }

        UserSubcommand::Meta { subcommand } => match subcommand {
            MetaSubcommand::Get { id, key } => {
                let value = store.get_meta(id, &key)?;
                if json {
                    print_json(&serde_json::json!({ "key": key, "value": value }))?;
                } else {
                    match value {
                        Some(v) => println!("{v}"),
                        None => anyhow::bail!("user {id} has no meta '{key}'"),
                    }
                }
            }
            MetaSubcommand::Set { id, key, value } => {
                store.set_meta(id, &key, &value)?;
                if !json {
                    println!("Set {key} for user {id}");
                }
            }
        },
    }
    Ok(())
}
