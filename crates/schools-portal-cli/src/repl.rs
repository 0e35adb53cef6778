//! Interactive REPL: the chat front end on a terminal.
//!
//! Launch with `schools-portal repl`. Every line goes through the same
//! dispatcher a chat user would hit, as a single local user. A few extra
//! diagnostic commands (`/discover`, `/subdomains`, `/form`) are local to
//! the REPL. Type `/help` for commands, Tab for completion.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use schools_portal::{PortalConfig, SchoolsClient};
use tokio::runtime::Handle;

use crate::chat::ChatFrontEnd;
use crate::render;
use crate::sessions::UserId;

/// The only user a terminal session has.
const LOCAL_USER: UserId = 0;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/login", "Log in to the portal"),
    ("/logout", "Forget the current login"),
    ("/cancel", "Abort a login in progress"),
    ("/profile", "Show the profile page"),
    ("/schedule", "Show the schedule [YYYY-MM-DD]"),
    ("/grades", "Show grades [quarter|semester|year]"),
    ("/homework", "Show homework [YYYY-MM-DD]"),
    ("/announcements", "Show announcements"),
    ("/search", "Search schools <query>"),
    ("/subdomains", "List school sub-sites"),
    ("/discover", "Probe well-known endpoints"),
    ("/form", "Describe the login form"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

const GRADE_PERIODS: &[&str] = &["quarter", "semester", "year"];

/// REPL helper for tab completion.
#[derive(Default)]
struct PortalHelper;

impl Completer for PortalHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        // grading period completion
        if let Some(args) = input.strip_prefix("/grades ") {
            let prefix_start = input.len() - args.len();
            let matches: Vec<Pair> = GRADE_PERIODS
                .iter()
                .filter(|p| p.starts_with(args.trim()))
                .map(|p| Pair {
                    display: p.to_string(),
                    replacement: p.to_string(),
                })
                .collect();
            return Ok((prefix_start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for PortalHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for PortalHelper {}
impl Validator for PortalHelper {}
impl Helper for PortalHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Run the interactive REPL. Blocks the calling thread; portal calls are
/// driven on `runtime`.
pub fn run(config: PortalConfig, runtime: Handle) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mschools-portal v{}\x1b[0m \x1b[90m{}\x1b[0m",
        env!("CARGO_PKG_VERSION"),
        config.base_url
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(false)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<PortalHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(rl_config)?;
    rl.set_helper(Some(PortalHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".schools_portal_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let chat = ChatFrontEnd::new(config);

    loop {
        let awaiting_password = runtime.block_on(chat.awaiting_password(LOCAL_USER));
        let prompt = if awaiting_password {
            " \x1b[33mpassword>\x1b[0m "
        } else if runtime.block_on(chat.awaiting_input(LOCAL_USER)) {
            " \x1b[33mlogin>\x1b[0m "
        } else {
            " \x1b[36mschools>\x1b[0m "
        };

        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Passwords never reach the history file.
                if !awaiting_password {
                    let _ = rl.add_history_entry(line);
                }

                let cmd = line.split_whitespace().next().unwrap_or("");

                match cmd {
                    "/exit" | "/quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "/help" | "/h" | "/?" => cmd_help(),
                    "/clear" | "/cls" => eprint!("\x1b[2J\x1b[H"),
                    "/discover" => cmd_discover(&runtime, chat.config()),
                    "/subdomains" => cmd_subdomains(&runtime, chat.config()),
                    "/form" => cmd_form(&runtime, chat.config()),
                    _ => {
                        let reply = runtime.block_on(chat.handle(LOCAL_USER, line));
                        print_reply(&reply);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or(std::path::Path::new(".")));
    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn print_reply(reply: &str) {
    println!();
    for line in reply.lines() {
        println!("  {line}");
    }
    println!();
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completion works for commands and grading periods.");
    eprintln!();
}

fn cmd_discover(runtime: &Handle, config: &PortalConfig) {
    let result = runtime.block_on(SchoolsClient::scoped(config.clone(), |client| {
        Box::pin(client.discover_endpoints())
    }));
    match result {
        Ok(report) => print_reply(&render::endpoint_report(&report)),
        Err(e) => eprintln!("  Discovery failed: {e}"),
    }
}

fn cmd_subdomains(runtime: &Handle, config: &PortalConfig) {
    let result = runtime.block_on(SchoolsClient::scoped(config.clone(), |client| {
        Box::pin(async move { Ok(client.get_subdomains_page().await) })
    }));
    match result {
        Ok(links) => print_reply(&render::links("School sub-sites", &links)),
        Err(e) => eprintln!("  Listing failed: {e}"),
    }
}

fn cmd_form(runtime: &Handle, config: &PortalConfig) {
    let result = runtime.block_on(SchoolsClient::scoped(config.clone(), |client| {
        Box::pin(client.analyze_login_form())
    }));
    match result {
        Ok(form) => print_reply(&render::form_snapshot(&form)),
        Err(e) => eprintln!("  Cannot analyze login form: {e}"),
    }
}
