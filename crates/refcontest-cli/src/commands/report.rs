//! Read-only reports.

use anyhow::{Result, bail};
use refcontest_core::{
    LeaderboardEntry, ReferralStats, Standing, StandingTier, User, UserId, referral_link,
};
use serde::Serialize;

use super::Context;

/// Prints store-wide counters.
pub fn stats(ctx: &Context) -> Result<()> {
    let stats = ctx.store.admin_stats()?;
    ctx.emit(&stats, |s| {
        println!("Contest:     {}", s.contest_state);
        println!(
            "Users:       {} ({} verified, {} unverified)",
            s.users_total, s.users_verified, s.users_unverified
        );
        println!(
            "Referrals:   {} ({} credited, {} pending)",
            s.referrals_total, s.referrals_credited, s.referrals_uncredited
        );
        println!(
            "Today:       {} users, {} referrals, {} verified",
            s.users_today, s.referrals_today, s.verified_joined_today
        );
        println!("Prizes:      {}", s.prizes);
        println!("Channels:    {}", s.channels);
    })
}

fn display_name(entry: &LeaderboardEntry) -> String {
    let name = entry.display_name.trim();
    let name = if name.is_empty() {
        entry.user_id.to_string()
    } else {
        name.to_string()
    };
    if entry.handle.is_empty() {
        name
    } else {
        format!("{name} @{}", entry.handle)
    }
}

/// Prints the `limit` best users.
pub fn top(ctx: &Context, limit: u32) -> Result<()> {
    let rows = ctx.store.top(limit)?;
    ctx.emit(&rows, |rows| {
        if rows.is_empty() {
            println!("No participants yet.");
            return;
        }
        for (i, entry) in rows.iter().enumerate() {
            println!("{:>3}. {:<40} {}", i + 1, display_name(entry), entry.score);
        }
    })
}

#[derive(Debug, Serialize)]
struct UserReport {
    user: User,
    stats: ReferralStats,
    standing: Standing,
    tier: StandingTier,
}

/// Prints one user's record and standing.
pub fn user(ctx: &Context, id: UserId) -> Result<()> {
    let Some(user) = ctx.store.user(id)? else {
        bail!("user {id} is not registered");
    };
    let standing = ctx.store.standing(id)?;
    let report = UserReport {
        stats: ctx.store.stats_for_user(id)?,
        tier: standing.tier(),
        standing,
        user,
    };
    ctx.emit(&report, |r| {
        println!("User:        {} ({})", r.user.user_id, r.user.display_name);
        if !r.user.handle.is_empty() {
            println!("Handle:      @{}", r.user.handle);
        }
        match r.user.referrer_id {
            Some(referrer) => println!("Referrer:    {referrer}"),
            None => println!("Referrer:    -"),
        }
        println!("Verified:    {}", r.user.verified);
        println!(
            "Invited:     {} ({} credited)",
            r.stats.total_invited, r.stats.credited_invited
        );
        println!("Score:       {}", r.stats.score);
        match r.standing.rank {
            Some(rank) => println!("Rank:        {rank}"),
            None => println!("Rank:        -"),
        }
        println!("Gap to 1st:  {}", r.standing.gap_to_first);
    })
}

/// Prints a user's invite link.
pub fn link(ctx: &Context, id: UserId) -> Result<()> {
    if ctx.config.bot_username.trim().is_empty() {
        bail!("bot_username is not configured");
    }
    let link = referral_link(&ctx.config.bot_username, id);
    ctx.emit(&link, |l| println!("{l}"))
}
