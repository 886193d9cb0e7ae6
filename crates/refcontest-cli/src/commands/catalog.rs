//! Prize and required-channel commands.

use anyhow::Result;
use clap::Subcommand;

use super::Context;

/// Prize subcommands.
#[derive(Debug, Subcommand)]
pub enum PrizeCommand {
    /// List prizes by place
    List,

    /// Add a prize
    Add {
        /// Place the prize is awarded for
        place: i64,

        /// Prize title
        title: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Remove a prize by id
    Remove {
        /// Prize id as shown by `prize list`
        id: i64,
    },
}

/// Channel subcommands.
#[derive(Debug, Subcommand)]
pub enum ChannelCommand {
    /// List required channels
    List,

    /// Require membership in a channel
    Add {
        /// Channel handle (`@name`) or invite link
        channel: String,
    },

    /// Stop requiring a channel
    Remove {
        /// Channel handle or invite link
        channel: String,
    },
}

/// Runs a prize subcommand.
pub fn run_prize(ctx: &Context, cmd: &PrizeCommand) -> Result<()> {
    match cmd {
        PrizeCommand::List => {
            let prizes = ctx.store.prizes()?;
            ctx.emit(&prizes, |prizes| {
                if prizes.is_empty() {
                    println!("No prizes yet.");
                }
                for p in prizes {
                    println!("#{:<4} place {:<3} {}", p.id, p.place, p.title);
                    if !p.description.is_empty() {
                        println!("      {}", p.description);
                    }
                }
            })
        },
        PrizeCommand::Add {
            place,
            title,
            description,
        } => {
            let id = ctx.store.add_prize(*place, title, description)?;
            ctx.done(&format!("prize {id} added"), true)
        },
        PrizeCommand::Remove { id } => {
            let removed = ctx.store.remove_prize(*id)?;
            ctx.done(&format!("prize {id} removed"), removed)
        },
    }
}

/// Runs a channel subcommand.
pub fn run_channel(ctx: &Context, cmd: &ChannelCommand) -> Result<()> {
    match cmd {
        ChannelCommand::List => {
            let channels = ctx.store.channels()?;
            ctx.emit(&channels, |channels| {
                if channels.is_empty() {
                    println!("No required channels.");
                }
                for c in channels {
                    println!("{c}");
                }
            })
        },
        ChannelCommand::Add { channel } => {
            let added = ctx.store.add_channel(channel)?;
            ctx.done(&format!("channel {} added", channel.trim()), added)
        },
        ChannelCommand::Remove { channel } => {
            let removed = ctx.store.remove_channel(channel)?;
            ctx.done(&format!("channel {} removed", channel.trim()), removed)
        },
    }
}
