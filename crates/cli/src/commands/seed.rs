use kopi_db::fixtures::{SeedDataset, SeedResult};

use crate::commands::{async_runtime, load_config, open_database, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let result = load_config().and_then(|config| {
        async_runtime()?.block_on(async {
            let pool = open_database(&config).await?;

            let seeded = SeedDataset::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5))?;
            let verification = SeedDataset::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6))?;

            let outcome = if verification.all_present {
                Ok(seeded)
            } else {
                Err(verification_failure(&verification.checks))
            };

            pool.close().await;
            outcome
        })
    });

    match result {
        Ok(SeedResult { outlets_seeded, products_seeded }) => CommandResult::success(
            "seed",
            format!("seeded {outlets_seeded} outlets and {products_seeded} product documents"),
        ),
        Err(failure) => CommandResult::from_step("seed", failure),
    }
}

fn verification_failure(checks: &[(&'static str, bool)]) -> StepFailure {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    let message = if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    };
    ("seed_verification", message, 6)
}
