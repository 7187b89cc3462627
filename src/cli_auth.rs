use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};

use image_gallery_server::{SqliteUserStore, UserManager};

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite user database file (user.db inside the server db dir).
    #[clap(value_parser = parse_path)]
    pub path: PathBuf,
}

#[derive(Parser)]
#[command(name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Creates a user with the given handle.
    AddUser { user_handle: String },

    /// Creates a password authentication for the given user.
    /// Fails if the user already has a password set.
    AddLogin {
        user_handle: String,
        password: String,
    },

    /// Change the password of a user, fails if no password was set.
    UpdateLogin {
        user_handle: String,
        password: String,
    },

    /// Deletes a user together with its credentials and tokens.
    /// Images uploaded by the user are kept and show an unknown author.
    DeleteUser { user_handle: String },

    /// Shows authentication information of a given user.
    Show { user_handle: String },

    /// Verifies the password of a given user, it doesn't make any
    /// persistent change, nor it creates any token, it just
    /// compares the password hash.
    CheckPassword {
        user_handle: String,
        password: String,
    },

    /// Shows all user handles.
    UserHandles,

    /// Shows the path of the current user db.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

const PROMPT: &str = ">> ";

fn check_password(user_manager: &UserManager, user_handle: &str, password: &str) -> Result<String> {
    let user_credentials = match user_manager.get_user_credentials(user_handle)? {
        Some(x) => x,
        None => return Ok(format!("User {} not found.", user_handle)),
    };
    let password_credentials = match user_credentials.username_password {
        Some(x) => x,
        None => return Ok(format!("User {} has no password set.", user_handle)),
    };
    let msg = match password_credentials
        .hasher
        .verify(password, &password_credentials.hash)?
    {
        true => "The password provided is correct!",
        false => "Wrong password.",
    };
    Ok(msg.to_owned())
}

fn execute_command(
    line: String,
    user_manager: &UserManager,
    db_path: String,
) -> CommandExecutionResult {
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    match cli {
        Ok(cli) => {
            println!("{} {}", PROMPT, &line);
            match cli.command {
                InnerCommand::AddUser { user_handle } => match user_manager.add_user(&user_handle) {
                    Ok(user_id) => println!("Created user {} with id {}", user_handle, user_id),
                    Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                },
                InnerCommand::AddLogin {
                    user_handle,
                    password,
                } => {
                    if let Err(err) =
                        user_manager.create_password_credentials(&user_handle, &password)
                    {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                }
                InnerCommand::UpdateLogin {
                    user_handle,
                    password,
                } => {
                    if let Err(err) =
                        user_manager.update_password_credentials(&user_handle, &password)
                    {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                }
                InnerCommand::DeleteUser { user_handle } => {
                    if let Err(err) = user_manager.delete_user(&user_handle) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                }
                InnerCommand::Show { user_handle } => {
                    let user_credentials = match user_manager.get_user_credentials(&user_handle) {
                        Ok(x) => x,
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    };
                    let user_tokens = match user_manager.get_user_tokens(&user_handle) {
                        Ok(x) => x,
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    };

                    println!("User Credentials:");
                    println!("{:#?}", user_credentials);

                    println!("\nAuth Tokens:");
                    for token in user_tokens.iter() {
                        println!("{:#?}", token);
                    }
                }
                InnerCommand::UserHandles => match user_manager.get_all_user_handles() {
                    Ok(handles) => println!("{:#?}", handles),
                    Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                },
                InnerCommand::Where => {
                    println!("{}", db_path);
                }
                InnerCommand::CheckPassword {
                    user_handle,
                    password,
                } => match check_password(user_manager, &user_handle, &password) {
                    Ok(msg) => println!("{}", msg),
                    Err(err) => {
                        return CommandExecutionResult::Error(format!(
                            "Could not verify the password, something went wrong: {}",
                            err
                        ))
                    }
                },
                InnerCommand::Exit => return CommandExecutionResult::Exit,
            }
        }

        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
        }
    }
    CommandExecutionResult::Ok
}

#[derive(rustyline_derive::Hinter)]
struct CommandsHelper {
    commands_names: Vec<String>,
}

impl CommandsHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        CommandsHelper { commands_names }
    }
}

impl Completer for CommandsHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for CommandsHelper {}
impl Validator for CommandsHelper {}
impl Helper for CommandsHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let user_store = Arc::new(SqliteUserStore::new(&cli_args.path)?);
    let user_manager = UserManager::new(user_store);

    InnerCli::command().print_long_help()?;

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<CommandsHelper, FileHistory>::with_config(config)?;
    rl.set_helper(Some(CommandsHelper::new()));

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &user_manager, cli_args.path.display().to_string()) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => {
                        break;
                    }
                    CommandExecutionResult::Error(err) => {
                        eprintln!("Error: {}", err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                println!("Error: {:?}", e);
                break;
            }
        }
    }
    Ok(())
}
