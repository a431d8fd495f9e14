use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use step::auth::cache::save_token;
use step::auth::{Md5TokenStrategy, TokenError, TokenStrategy};
use step::integrity::{file_md5, IntegrityStatus};
use step::logging::*;
use step::serve::{ServeOptions, DEFAULT_LISTEN};
use step::{ClientConfig, LogCallback, StepClient, StepError, Uploader};

/////////
// CLI //
/////////

fn credential_args(cmd: Command, required: bool) -> Command {
	cmd.arg(
		Arg::new("id")
			.long("id")
			.value_name("USER")
			.required(required)
			.help("User id to log in with"),
	)
	.arg(
		Arg::new("password")
			.long("password")
			.value_name("PASSWORD")
			.help("Password (defaults to the user id)"),
	)
}

fn build_cli() -> Command {
	Command::new("step")
		.version(env!("CARGO_PKG_VERSION"))
		.about("STEP block-chunked file transfer")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.help("Config file (TOML, or JSON5 with a .json/.json5 extension)"),
		)
		.arg(
			Arg::new("server")
				.short('s')
				.long("server")
				.value_name("HOST")
				.global(true)
				.help("Server address"),
		)
		.arg(
			Arg::new("port")
				.short('p')
				.long("port")
				.value_name("PORT")
				.value_parser(clap::value_parser!(u16))
				.global(true)
				.help("Server port"),
		)
		.arg(
			Arg::new("verbose")
				.short('v')
				.long("verbose")
				.action(ArgAction::SetTrue)
				.global(true)
				.help("Debug logging"),
		)
		.subcommand(credential_args(
			Command::new("login").about("Log in, verify and cache the token"),
			true,
		))
		.subcommand(
			credential_args(Command::new("upload").about("Upload a file"), true)
				.arg(
					Arg::new("allow-large")
						.long("allow-large")
						.action(ArgAction::SetTrue)
						.help("Upload files above the size warning limit"),
				)
				.arg(
					Arg::new("verify")
						.long("verify")
						.action(ArgAction::SetTrue)
						.help("Query the server digest after the upload and compare"),
				)
				.arg(Arg::new("file").required(true).value_name("FILE")),
		)
		.subcommand(
			credential_args(
				Command::new("get")
					.about("Show the server digest of a stored file")
					.after_help("Without --id the token cached by the last login is used."),
				false,
			)
			.arg(Arg::new("key").required(true).value_name("KEY")),
		)
		.subcommand(
			Command::new("token")
				.about("Verify a token and print its claims")
				.arg(Arg::new("token").required(true).value_name("TOKEN")),
		)
		.subcommand(
			Command::new("serve")
				.about("Run the reference server")
				.arg(
					Arg::new("dir")
						.short('d')
						.long("dir")
						.value_name("DIR")
						.required(true)
						.help("Storage directory"),
				)
				.arg(
					Arg::new("listen")
						.short('l')
						.long("listen")
						.value_name("ADDR")
						.default_value(DEFAULT_LISTEN)
						.help("Listen address"),
				)
				.arg(
					Arg::new("block-size")
						.long("block-size")
						.value_name("BYTES")
						.value_parser(clap::value_parser!(u64))
						.help("Block size handed out in upload plans"),
				),
		)
}

////////////
// Config //
////////////

fn load_config(matches: &ArgMatches) -> Result<ClientConfig, StepError> {
	let mut config = step::config::load(matches.get_one::<String>("config").map(Path::new))?;
	if let Some(server) = matches.get_one::<String>("server") {
		config.server = server.clone();
	}
	if let Some(port) = matches.get_one::<u16>("port") {
		config.port = *port;
	}
	if matches.get_flag("verbose") {
		config.log_level = "debug".to_string();
	}
	config.validate()?;
	Ok(config)
}

//////////////
// Commands //
//////////////

/// Log in and verify the token before trusting it
async fn authenticate(client: &StepClient, sub: &ArgMatches) -> Result<String, StepError> {
	let id = sub.get_one::<String>("id").map(|s| s.as_str()).unwrap_or_default();
	let password = sub.get_one::<String>("password").map(|s| s.as_str()).unwrap_or(id);

	let token = client.login(id, password).await?;
	match client.verify_token(&token) {
		Ok(claims) => debug!("Token issued to {} at {}", claims.username, claims.timestamp),
		Err(StepError::Token(TokenError::SignatureMismatch)) => {
			error!("Token signature verification failed, the server cannot be trusted");
			return Err(StepError::Token(TokenError::SignatureMismatch));
		}
		Err(e) => {
			error!("Token could not be decoded, client and server protocol versions may differ");
			return Err(e);
		}
	}

	let token_file = &client.config().token_file;
	save_token(token_file, &token).await.map_err(|source| StepError::LocalFile {
		path: token_file.display().to_string(),
		source,
	})?;
	Ok(token)
}

async fn cmd_upload(client: &StepClient, sub: &ArgMatches) -> Result<(), StepError> {
	let file = sub.get_one::<String>("file").map(PathBuf::from).unwrap_or_default();
	let token = authenticate(client, sub).await?;

	let outcome =
		Uploader::new(client).with_callback(Arc::new(LogCallback)).upload(&token, &file).await?;

	if sub.get_flag("verify") {
		let key = outcome.key;
		match client.query_md5(&token, &key).await? {
			Some(remote) => {
				let local = file_md5(&file).await.map_err(|source| StepError::LocalFile {
					path: file.display().to_string(),
					source,
				})?;
				match IntegrityStatus::compare(&local, &remote) {
					IntegrityStatus::Mismatch { local, remote } => {
						warn!("Stored file differs: local {}, server {}", local, remote)
					}
					_ => info!("Stored file verified, MD5 {}", local),
				}
			}
			None => info!("No verification available for {}", key),
		}
	}
	Ok(())
}

async fn cmd_get(client: &StepClient, sub: &ArgMatches) -> Result<(), StepError> {
	let key = sub.get_one::<String>("key").map(|s| s.as_str()).unwrap_or_default();
	let token = if sub.contains_id("id") {
		authenticate(client, sub).await?
	} else {
		client.cached_token().await?.ok_or_else(|| StepError::InvalidConfig {
			message: format!(
				"no cached token in {}, log in first or pass --id",
				client.config().token_file.display()
			),
		})?
	};
	match client.query_md5(&token, key).await? {
		Some(digest) => println!("{}  {}", digest, key),
		None => println!("no verification available for {}", key),
	}
	Ok(())
}

fn cmd_token(config: &ClientConfig, sub: &ArgMatches) -> Result<(), StepError> {
	let token = sub.get_one::<String>("token").map(|s| s.as_str()).unwrap_or_default();
	let claims = Md5TokenStrategy::new(config.token_secret.clone()).verify(token)?;
	println!("username:  {}", claims.username);
	println!("timestamp: {}", claims.timestamp);
	println!("nonce:     {}", claims.nonce);
	Ok(())
}

async fn cmd_serve(config: &ClientConfig, sub: &ArgMatches) -> Result<(), StepError> {
	let mut options = ServeOptions {
		token_secret: config.token_secret.clone(),
		max_frame_size: config.max_frame_size,
		..ServeOptions::default()
	};
	if let Some(dir) = sub.get_one::<String>("dir") {
		options.storage_dir = PathBuf::from(dir);
	}
	if let Some(listen) = sub.get_one::<String>("listen") {
		options.listen = listen.clone();
	}
	if let Some(block_size) = sub.get_one::<u64>("block-size") {
		options.block_size = *block_size;
	}
	step::serve::serve(options).await
}

async fn run(matches: ArgMatches) -> Result<(), StepError> {
	let config = load_config(&matches)?;
	init_tracing(&config.log_level);

	match matches.subcommand() {
		Some(("serve", sub)) => cmd_serve(&config, sub).await,
		Some(("token", sub)) => cmd_token(&config, sub),
		Some((name, sub)) => {
			let mut config = config;
			if name == "upload" && sub.get_flag("allow-large") {
				config.allow_oversize = true;
			}
			let client = StepClient::new(config);
			match name {
				"login" => authenticate(&client, sub).await.map(|_| ()),
				"upload" => cmd_upload(&client, sub).await,
				"get" => cmd_get(&client, sub).await,
				other => Err(StepError::InvalidConfig { message: format!("unknown command {}", other) }),
			}
		}
		None => Ok(()),
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let matches = build_cli().get_matches();
	if let Err(e) = run(matches).await {
		eprintln!("Error: {}", e);
		std::process::exit(1);
	}
}

// vim: ts=4
