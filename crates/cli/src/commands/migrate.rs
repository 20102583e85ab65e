use crate::commands::{async_runtime, load_config, open_database, CommandResult};

pub fn run() -> CommandResult {
    let result = load_config().and_then(|config| {
        async_runtime()?.block_on(async {
            let pool = open_database(&config).await?;
            pool.close().await;
            Ok(())
        })
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => CommandResult::from_step("migrate", failure),
    }
}
