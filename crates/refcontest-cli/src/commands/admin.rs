//! Admin set and ad settings.

use anyhow::{Result, bail};
use clap::Subcommand;
use refcontest_core::{AdButton, AdFooterCache, AdminError, UserId};
use serde::Serialize;

use super::Context;

/// Admin subcommands.
#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// List admins (configured ones first)
    List,

    /// Grant admin rights
    Add {
        /// User id
        id: UserId,
    },

    /// Revoke admin rights granted at runtime
    Remove {
        /// User id
        id: UserId,
    },
}

/// Ad subcommands.
#[derive(Debug, Subcommand)]
pub enum AdsCommand {
    /// Show the footer and button
    Show,

    /// Set the footer appended to outgoing messages
    Footer {
        /// Footer text; empty to remove
        text: String,
    },

    /// Set the ad button
    Button {
        /// Button label
        text: String,

        /// Button URL
        url: String,
    },

    /// Remove the footer and button
    Clear,
}

#[derive(Debug, Serialize)]
struct AdminEntry {
    user_id: UserId,
    configured: bool,
}

/// Runs an admin subcommand.
pub fn run_admin(ctx: &Context, cmd: &AdminCommand) -> Result<()> {
    let admins = ctx.admins();
    match cmd {
        AdminCommand::List => {
            let entries: Vec<AdminEntry> = admins
                .list()?
                .into_iter()
                .map(|user_id| AdminEntry {
                    user_id,
                    configured: admins.is_static(user_id),
                })
                .collect();
            ctx.emit(&entries, |entries| {
                for e in entries {
                    if e.configured {
                        println!("{} (configured)", e.user_id);
                    } else {
                        println!("{}", e.user_id);
                    }
                }
            })
        },
        AdminCommand::Add { id } => {
            let changed = !admins.is_admin(*id)?;
            admins.add(*id)?;
            ctx.done(&format!("admin {id} added"), changed)
        },
        AdminCommand::Remove { id } => match admins.remove(*id) {
            Ok(()) => ctx.done(&format!("admin {id} removed"), true),
            Err(AdminError::StaticAdmin(id)) => {
                bail!("admin {id} comes from the configuration; remove it there")
            },
            Err(e) => Err(e.into()),
        },
    }
}

#[derive(Debug, Serialize)]
struct AdsReport {
    footer: String,
    button: Option<AdButton>,
}

/// Runs an ad subcommand.
pub fn run_ads(ctx: &Context, cmd: &AdsCommand) -> Result<()> {
    let cache = AdFooterCache::new(ctx.config.ads.cache_ttl());
    match cmd {
        AdsCommand::Show => {
            let report = AdsReport {
                footer: cache.footer(&ctx.store)?,
                button: ctx.store.ad_button()?,
            };
            ctx.emit(&report, |r| {
                if r.footer.is_empty() {
                    println!("Footer: -");
                } else {
                    println!("Footer: {}", r.footer);
                }
                match &r.button {
                    Some(b) => println!("Button: {} -> {}", b.text, b.url),
                    None => println!("Button: -"),
                }
            })
        },
        AdsCommand::Footer { text } => {
            cache.set_footer(&ctx.store, text)?;
            ctx.done("ad footer updated", true)
        },
        AdsCommand::Button { text, url } => {
            ctx.store.set_ad_button(text, url)?;
            ctx.done("ad button updated", true)
        },
        AdsCommand::Clear => {
            cache.set_footer(&ctx.store, "")?;
            ctx.store.set_ad_button("", "")?;
            ctx.done("ads cleared", true)
        },
    }
}
