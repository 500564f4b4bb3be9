use std::path::Path;

use anyhow::{bail, Result};
use chrono_tz::Tz;
use tracing::info;

use crate::client::{BookingClient, ScheduleApi};
use crate::config;
use crate::models::{ClassType, Config, ScheduledClass, User};
use crate::summary::SummaryWriter;
use crate::worker::Worker;

/// Resolve email/password from CLI flags or the first user in config.
pub fn resolve_credentials<'a>(
    user_flag: &'a Option<String>,
    pass_flag: &'a Option<String>,
    first_user: Option<&'a User>,
) -> Result<(&'a str, &'a str)> {
    let email = match user_flag {
        Some(u) => u.as_str(),
        None => first_user
            .map(|u| u.email.as_str())
            .ok_or_else(|| anyhow::anyhow!("No users in config and no --user provided"))?,
    };
    let password = match pass_flag {
        Some(p) => p.as_str(),
        None => first_user
            .map(|u| u.password.as_str())
            .ok_or_else(|| anyhow::anyhow!("No users in config and no --password provided"))?,
    };
    Ok((email, password))
}

fn make_client(config: &Config) -> Result<BookingClient> {
    Ok(BookingClient::new(
        &config.service.base_url,
        &config.service.facility_id,
        config.service.timeout(),
    )?)
}

/// Start one booking worker per user and class type and run forever.
pub async fn run_daemon(config: Config) -> Result<()> {
    let tz: Tz = config
        .service
        .timezone
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid timezone: {}", e))?;
    let summary = config
        .service
        .summary_file
        .clone()
        .map(SummaryWriter::new);

    let mut handles = Vec::new();
    for user in &config.users {
        let mut class_types: Vec<ClassType> = Vec::new();
        for pref in &user.preferences {
            if !class_types.contains(&pref.class_type) {
                class_types.push(pref.class_type);
            }
        }

        for class_type in class_types {
            let client = make_client(&config)?;
            let worker = Worker::new(
                client,
                user.clone(),
                class_type,
                tz,
                config.poll.clone(),
                summary.clone(),
            );
            info!("Spawning worker for {} ({})", user.name, class_type);
            handles.push(tokio::spawn(worker.run()));
        }
    }

    if handles.is_empty() {
        bail!("No preferences configured; nothing to do");
    }

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

/// Print a user's upcoming scheduled classes across all class types.
pub async fn run_bookings(
    config_path: &Path,
    user: &Option<String>,
    password: &Option<String>,
) -> Result<()> {
    let config = config::load_config(config_path)?;
    let (email, pass) = resolve_credentials(user, password, config.users.first())?;

    let client = make_client(&config)?;
    let session = client.authenticate(email, pass).await?;

    let mut any = false;
    for class_type in ClassType::ALL {
        let raw = client.scheduled_classes(&session, class_type).await?;
        let mut active = Vec::new();
        for booking in &raw {
            if booking.status.eq_ignore_ascii_case("active") {
                active.push(ScheduledClass::from_remote(booking)?);
            }
        }
        if active.is_empty() {
            continue;
        }
        any = true;
        println!("{}:", class_type);
        for class in &active {
            println!(
                "  {} ({}) at {} — booking {}",
                class.date, class.weekday, class.time, class.booking_id
            );
        }
    }

    if !any {
        println!("No upcoming classes for {}.", email);
    }
    Ok(())
}

/// Cancel one booking by its identifier.
pub async fn run_cancel(
    config_path: &Path,
    user: &Option<String>,
    password: &Option<String>,
    booking_id: &str,
) -> Result<()> {
    let config = config::load_config(config_path)?;
    let (email, pass) = resolve_credentials(user, password, config.users.first())?;

    let client = make_client(&config)?;
    let session = client.authenticate(email, pass).await?;
    client.cancel(&session, booking_id).await?;

    println!("Cancelled booking {}", booking_id);
    Ok(())
}
