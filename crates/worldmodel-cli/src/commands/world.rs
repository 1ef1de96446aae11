use worldmodel_core::{WorldState, WorldValidator};

use super::{CmdResult, Context};

pub fn init(ctx: &Context, user: &str, force: bool) -> CmdResult {
    if ctx.world_path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            ctx.world_path.display()
        )
        .into());
    }
    let config = ctx.config()?;
    let state = WorldState::from_config(user, &config);
    ctx.save_world(&state)?;
    println!("world for {user} written to {}", ctx.world_path.display());
    Ok(())
}

pub fn check(ctx: &Context, json: bool) -> CmdResult {
    let state = ctx.load_world()?;
    let audit = WorldValidator::new().check_consistency(&state);

    if json {
        println!("{}", serde_json::to_string_pretty(&audit)?);
    } else if audit.is_valid {
        println!("ok: {} tasks, no conflicts", state.all_tasks.len());
    } else {
        for conflict in &audit.conflicts {
            println!("{}: {}", conflict.kind(), conflict.message());
        }
    }

    if audit.is_valid {
        Ok(())
    } else {
        Err(format!("{} conflict(s) found", audit.conflicts.len()).into())
    }
}
