use crate::output::{print_json, print_table};
use archetype_core::funnel;
use archetype_core::user::{FileUserStore, UserId, UserStore};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum FunnelSubcommand {
    /// List configured funnels
    List,

    /// Show the next phase a user must complete
    Next {
        name: String,
        #[arg(long)]
        user: UserId,
    },

    /// Record that a user visited a phase
    Visit {
        name: String,
        phase: String,
        #[arg(long)]
        user: UserId,
    },

    /// Mark signup as completed for a user
    Complete {
        #[arg(long)]
        user: UserId,
    },
}

pub fn run(root: &Path, subcmd: FunnelSubcommand, json: bool) -> anyhow::Result<()> {
    let site = super::load_site(root)?;
    let store = FileUserStore::open(root);

    match subcmd {
        FunnelSubcommand::List => {
            let names = site.funnel_names();
            if json {
                return print_json(&names);
            }
            if names.is_empty() {
                println!("No funnels.");
            }
            for name in names {
                println!("{name}");
            }
        }

        FunnelSubcommand::Next { name, user } => {
            // Surface an unknown user before reading meta.
            store.user(user)?;
            let funnel = site.funnel(&name)?;
            let next = funnel.next_phase(&store, user)?;
            let progress = funnel.progress(&store, user)?;
            let completed = funnel::is_complete(&store, user)?;

            if json {
                return print_json(&serde_json::json!({
                    "funnel": name,
                    "next": next,
                    "progress": progress,
                    "completed": completed,
                }));
            }

            match next {
                Some(phase) => println!("Next: {} -> {}", phase.slug, phase.redirect),
                None => println!("All phases passed."),
            }
            let rows = progress
                .iter()
                .map(|p| {
                    vec![
                        p.slug.clone(),
                        p.name.clone(),
                        if p.done { "done" } else { "" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["PHASE", "NAME", "STATUS"], rows);
        }

        FunnelSubcommand::Visit { name, phase, user } => {
            let funnel = site.funnel(&name)?;
            if !funnel.phases.iter().any(|p| p.slug == phase) {
                anyhow::bail!("funnel '{name}' has no phase '{phase}'");
            }
            funnel.mark_visited(&store, user, &phase)?;
            if !json {
                println!("Visited {name}/{phase} for user {user}");
            }
        }

        FunnelSubcommand::Complete { user } => {
            funnel::complete(&store, user)?;
            if !json {
                println!("Signup completed for user {user}");
            }
        }
    }
    Ok(())
}
