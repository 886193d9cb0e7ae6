//! Contest lifecycle and reset commands.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use refcontest_core::{FinishOptions, ResetOptions};

use super::Context;

/// Contest lifecycle subcommands.
#[derive(Debug, Subcommand)]
pub enum ContestCommand {
    /// Show whether the contest is running
    Status,

    /// Reopen the contest to users
    Start,

    /// Close the contest to non-admins
    Stop,

    /// Stop the contest and delete all users and referrals
    Finish {
        /// Also delete prizes
        #[arg(long)]
        clear_prizes: bool,

        /// Also delete admins added at runtime
        #[arg(long)]
        clear_admins: bool,

        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },
}

/// Arguments for `refcontest reset`.
#[derive(Debug, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct ResetArgs {
    /// Delete all users
    #[arg(long)]
    pub users: bool,

    /// Delete all referrals
    #[arg(long)]
    pub referrals: bool,

    /// Delete all prizes
    #[arg(long)]
    pub prizes: bool,

    /// Delete admins added at runtime
    #[arg(long)]
    pub admins: bool,

    /// Restore default settings
    #[arg(long)]
    pub settings: bool,

    /// Select everything above
    #[arg(long)]
    pub all: bool,

    /// Confirm the deletion
    #[arg(long)]
    pub yes: bool,
}

impl ResetArgs {
    fn options(&self) -> ResetOptions {
        ResetOptions {
            users: self.all || self.users,
            referrals: self.all || self.referrals,
            prizes: self.all || self.prizes,
            admins: self.all || self.admins,
            settings: self.all || self.settings,
        }
    }
}

/// Runs a lifecycle subcommand.
pub fn run(ctx: &Context, cmd: &ContestCommand) -> Result<()> {
    match cmd {
        ContestCommand::Status => {
            let state = ctx.store.contest_state()?;
            ctx.emit(&state, |s| println!("{s}"))
        },
        ContestCommand::Start => {
            let changed = !ctx.store.is_active()?;
            ctx.store.start_contest()?;
            ctx.done("contest started", changed)
        },
        ContestCommand::Stop => {
            let changed = ctx.store.is_active()?;
            ctx.store.stop_contest()?;
            ctx.done("contest stopped", changed)
        },
        ContestCommand::Finish {
            clear_prizes,
            clear_admins,
            yes,
        } => {
            if !yes {
                bail!("finishing deletes every user and referral; pass --yes to confirm");
            }
            ctx.store.finish_contest(FinishOptions {
                clear_prizes: *clear_prizes,
                clear_admins: *clear_admins,
            })?;
            ctx.done("contest finished", true)
        },
    }
}

/// Deletes the selected data.
pub fn reset(ctx: &Context, args: &ResetArgs) -> Result<()> {
    let options = args.options();
    if options == ResetOptions::default() {
        bail!("nothing selected; pass --users, --referrals, --prizes, --admins, --settings or --all");
    }
    if !args.yes {
        bail!("reset deletes data; pass --yes to confirm");
    }
    ctx.store.reset_all(options)?;
    ctx.done("reset complete", true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ResetArgs {
        ResetArgs {
            users: false,
            referrals: false,
            prizes: false,
            admins: false,
            settings: false,
            all: false,
            yes: true,
        }
    }

    #[test]
    fn all_selects_every_table() {
        let options = ResetArgs { all: true, ..args() }.options();
        assert!(options.users && options.referrals && options.prizes);
        assert!(options.admins && options.settings);
    }

    #[test]
    fn individual_flags_map_through() {
        let options = ResetArgs {
            referrals: true,
            ..args()
        }
        .options();
        assert_eq!(
            options,
            ResetOptions {
                referrals: true,
                ..ResetOptions::default()
            }
        );
    }
}
