// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rls_config::{LogFormat, LoggingConfig, RlsConfig};
use rls_core::{Action, EntityType, UserId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Row-level security policy engine administration.
#[derive(Parser, Debug)]
#[command(name = "rls", about = "Row-level security policy engine", version)]
struct Args {
	/// Configuration file (defaults to /etc/rls/engine.toml)
	#[arg(long, global = true, env = "RLS_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Apply database migrations
	Migrate,

	/// Register the stock policies
	SeedDefaults {
		/// User recorded as the creator of the policies
		#[arg(long)]
		created_by: i64,
	},

	/// Decide a single access request
	Check {
		#[arg(long)]
		user: i64,
		#[arg(long)]
		entity: EntityType,
		#[arg(long, default_value = "select")]
		action: Action,
		#[arg(long)]
		entity_id: Option<i64>,
		#[arg(long)]
		table: Option<String>,
		#[arg(long)]
		session: Option<String>,
	},

	/// List policies
	Policies {
		#[arg(long)]
		entity: Option<EntityType>,
		#[arg(long)]
		action: Option<Action>,
		/// Include inactive policies
		#[arg(long)]
		all: bool,
	},

	/// Summarise recent access decisions
	AuditStats {
		#[arg(long, default_value_t = 7)]
		days: i64,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => rls_config::load_config_with_file(path.clone())?,
		None => rls_config::load_config()?,
	};
	init_tracing(&config.logging);

	run(args.command, &config).await
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);

	match logging.format {
		LogFormat::Json => registry
			.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
			.init(),
		LogFormat::Pretty => registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init(),
	}
}

async fn run(command: Command, config: &RlsConfig) -> anyhow::Result<()> {
	match command {
		Command::Migrate => commands::migrate(config).await,
		Command::SeedDefaults { created_by } => {
			commands::seed_defaults(config, UserId::new(created_by)).await
		}
		Command::Check {
			user,
			entity,
			action,
			entity_id,
			table,
			session,
		} => {
			let mut request = rls_engine::AccessRequest::new(UserId::new(user), entity, action);
			request.entity_id = entity_id;
			request.table_name = table;
			request.session_id = session;
			commands::check(config, &request).await
		}
		Command::Policies {
			entity,
			action,
			all,
		} => commands::policies(config, entity, action, all).await,
		Command::AuditStats { days } => commands::audit_stats(config, days).await,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_check() {
		let args = Args::parse_from([
			"rls",
			"check",
			"--user",
			"1",
			"--entity",
			"project",
			"--action",
			"update",
			"--entity-id",
			"42",
		]);
		match args.command {
			Command::Check {
				user,
				entity,
				action,
				entity_id,
				..
			} => {
				assert_eq!(user, 1);
				assert_eq!(entity, EntityType::Project);
				assert_eq!(action, Action::Update);
				assert_eq!(entity_id, Some(42));
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn test_parse_global_config() {
		let args = Args::parse_from(["rls", "audit-stats", "--config", "/tmp/rls.toml"]);
		assert_eq!(args.config, Some(PathBuf::from("/tmp/rls.toml")));
		assert!(matches!(args.command, Command::AuditStats { days: 7 }));
	}

	#[test]
	fn test_rejects_unknown_entity() {
		let result = Args::try_parse_from(["rls", "check", "--user", "1", "--entity", "invoice"]);
		assert!(result.is_err());
	}
}
