//! Purpose: `shelfstore` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout; errors go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All store mutations go through `api::RecordService` or a remote server.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;
mod serve;

use shelfstore::api::{
    Action, CrudRequest, DuplicatePolicy, Error, ErrorKind, FileStore, MatchMode, Record,
    RecordService, RemoteClient, ServiceOptions, Target, to_exit_code,
};
use shelfstore::default_data_dir;

const DEFAULT_BIND: &str = "127.0.0.1:5000";
const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    run_with_args(std::env::args_os())
}

fn run_with_args<I>(args: I) -> Result<RunOutcome, (Error, ColorMode)>
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let context = RunContext {
        data_dir: cli.dir.unwrap_or_else(default_data_dir),
        remote: cli.remote,
        options: ServiceOptions::new()
            .with_match_mode(cli.match_mode.into())
            .with_duplicates(if cli.reject_duplicates {
                DuplicatePolicy::Reject
            } else {
                DuplicatePolicy::Allow
            }),
    };

    command_dispatch::dispatch_command(cli.command, context)
        .map_err(add_corrupt_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "shelfstore",
    version,
    about = "Product catalog and product list records on plain files",
    long_about = None,
    after_help = r#"EXAMPLES
  $ shelfstore catalog create --data-json '{"productName":"Widget","description":"d","features":["f1"],"specs":["s1"]}'
  $ shelfstore catalog show
  $ shelfstore products create --data-json '{"name":"X","subtitle":"s","price":1,"specs":[]}'
  $ shelfstore products delete X
  $ shelfstore serve --bind 127.0.0.1:5000
  $ shelfstore --remote http://127.0.0.1:5000 products list"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Data directory holding catalog.txt and products.json (default: ~/.shelfstore/memory)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Send catalog/products commands to a running server instead of local files"
    )]
    remote: Option<String>,
    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "prefix",
        help = "How catalog sections are matched by product name: prefix|exact"
    )]
    match_mode: MatchModeCli,
    #[arg(
        long,
        global = true,
        help = "Fail create when a record with the same name already exists"
    )]
    reject_duplicates: bool,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum MatchModeCli {
    Prefix,
    Exact,
}

impl From<MatchModeCli> for MatchMode {
    fn from(value: MatchModeCli) -> Self {
        match value {
            MatchModeCli::Prefix => MatchMode::Prefix,
            MatchModeCli::Exact => MatchMode::Exact,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Read and edit the product catalog text"
    )]
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    #[command(
        arg_required_else_help = true,
        about = "Read and edit the product list"
    )]
    Products {
        #[command(subcommand)]
        command: ProductsCommand,
    },
    #[command(about = "Serve the catalog and product list over HTTP")]
    Serve(ServeArgs),
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CatalogCommand {
    #[command(about = "Print the catalog text as {\"content\": ...}")]
    Show,
    #[command(about = "Append a catalog section")]
    Create(DataArgs),
    #[command(about = "Replace the first section matching productName")]
    Update(DataArgs),
    #[command(about = "Remove the first section matching a product name")]
    Delete {
        #[arg(value_name = "PRODUCT_NAME")]
        product_name: String,
    },
}

#[derive(Subcommand)]
enum ProductsCommand {
    #[command(about = "Print the product list as {\"data\": [...]}")]
    List,
    #[command(about = "Append a product record")]
    Create(DataArgs),
    #[command(about = "Merge fields into the first record with the same name")]
    Update(DataArgs),
    #[command(about = "Remove the first record with this name")]
    Delete {
        #[arg(value_name = "PRODUCT_NAME")]
        product_name: String,
    },
}

#[derive(Args)]
struct DataArgs {
    #[arg(
        long = "data-json",
        value_name = "JSON",
        help = "Request data as a JSON object, or - to read it from stdin"
    )]
    data_json: String,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(
        long,
        default_value = DEFAULT_BIND,
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
    #[arg(
        long = "cors-origin",
        value_name = "ORIGIN",
        help = "Allow browser requests from this origin (repeatable, * for any)",
        help_heading = "Connection"
    )]
    cors_origin: Vec<String>,
    #[arg(
        long,
        help = "Allow non-loopback binds",
        help_heading = "Safety"
    )]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_BODY_BYTES,
        help = "Max request body size in bytes",
        help_heading = "Safety"
    )]
    max_body_bytes: u64,
}

struct RunContext {
    data_dir: PathBuf,
    remote: Option<String>,
    options: ServiceOptions,
}

/// Where catalog and products commands are executed.
enum Backend {
    Local(RecordService<FileStore>),
    Remote(RemoteClient),
}

impl Backend {
    fn open(context: &RunContext) -> Result<Self, Error> {
        match context.remote.as_deref() {
            Some(base_url) => Ok(Backend::Remote(RemoteClient::new(base_url)?)),
            None => {
                let store = FileStore::open(&context.data_dir)?;
                Ok(Backend::Local(
                    RecordService::new(store).with_options(context.options),
                ))
            }
        }
    }

    fn read_catalog(&self) -> Result<String, Error> {
        match self {
            Backend::Local(service) => service.read_catalog(),
            Backend::Remote(client) => client.catalog(),
        }
    }

    fn list_products(&self) -> Result<Vec<Record>, Error> {
        match self {
            Backend::Local(service) => service.list_products(),
            Backend::Remote(client) => client.products(),
        }
    }

    fn execute(&self, request: &CrudRequest) -> Result<(), Error> {
        match self {
            Backend::Local(service) => service.execute(request),
            Backend::Remote(client) => client.send(request),
        }
    }
}

fn data_request(action: Action, target: Target, args: &DataArgs) -> Result<CrudRequest, Error> {
    let data = if args.data_json == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read data from stdin")
                .with_source(err)
        })?;
        parse_inline_json(&buf)?
    } else {
        parse_inline_json(&args.data_json)?
    };
    if !data.is_object() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--data-json must be a JSON object")
            .with_hint("Provide an object like '{\"productName\":\"Widget\"}'."));
    }
    Ok(CrudRequest::new(action, target, data))
}

fn delete_request(target: Target, product_name: &str) -> CrudRequest {
    CrudRequest::new(
        Action::Delete,
        target,
        json!({ "productName": product_name }),
    )
}

fn parse_inline_json(data: &str) -> Result<Value, Error> {
    serde_json::from_str(data).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid json")
            .with_hint("Provide a single JSON object (e.g. '{\"name\":\"X\"}').")
            .with_source(err)
    })
}

fn serve_config_from_args(
    args: ServeArgs,
    data_dir: &Path,
    options: ServiceOptions,
) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = args.bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:5000.")
    })?;
    Ok(serve::ServeConfig {
        bind,
        data_dir: data_dir.to_path_buf(),
        cors_origins: args.cors_origin,
        allow_non_loopback: args.allow_non_loopback,
        max_body_bytes: args.max_body_bytes,
        options,
    })
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Permission => err.with_hint(
            "Permission denied. Check directory permissions or use --dir to a writable location.",
        ),
        ErrorKind::Busy => err.with_hint("Store is busy (another writer holds the lock). Retry."),
        ErrorKind::Io => err.with_hint("I/O error. Check the path, filesystem, and disk space."),
        _ => err,
    }
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("Stored data could not be decoded. Inspect or restore the file under --dir.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Validation => "invalid request data".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(key) = err.key() {
        lines.push(format!(
            "{} {key}",
            colorize_label("key:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `shelfstore --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "shelfstore") else {
        return "Try `shelfstore --help`.".to_string();
    };
    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect();
    if parts.is_empty() {
        return "Try `shelfstore --help`.".to_string();
    }
    format!("Try `shelfstore {} --help`.", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, ColorMode, Command, DEFAULT_MAX_BODY_BYTES, DataArgs, ProductsCommand, clap_error_hint,
        data_request, delete_request, error_json, error_text, parse_inline_json, run_with_args,
        serve_config_from_args,
    };
    use clap::{CommandFactory, Parser};
    use serde_json::json;
    use shelfstore::api::{Action, Error, ErrorKind, MatchMode, ServiceOptions, Target};
    use std::ffi::OsString;
    use std::path::Path;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults_to_loopback_port_5000() {
        let cli = Cli::try_parse_from(["shelfstore", "serve"]).expect("parse");
        let Command::Serve(serve_args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(serve_args.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        let config = serve_config_from_args(serve_args, Path::new("/tmp/data"), ServiceOptions::new())
            .expect("config");
        assert_eq!(config.bind.to_string(), "127.0.0.1:5000");
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "shelfstore",
            "products",
            "delete",
            "X",
            "--match-mode",
            "exact",
            "--reject-duplicates",
        ])
        .expect("parse");
        assert_eq!(MatchMode::from(cli.match_mode), MatchMode::Exact);
        assert!(cli.reject_duplicates);
        assert!(matches!(
            cli.command,
            Command::Products {
                command: ProductsCommand::Delete { .. }
            }
        ));
    }

    #[test]
    fn invalid_bind_is_usage_error() {
        let cli = Cli::try_parse_from(["shelfstore", "serve", "--bind", "localhost"]).expect("parse");
        let Command::Serve(serve_args) = cli.command else {
            panic!("expected serve");
        };
        let err = serve_config_from_args(serve_args, Path::new("/tmp"), ServiceOptions::new())
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn data_json_must_be_an_object() {
        let err = data_request(
            Action::Create,
            Target::Products,
            &DataArgs {
                data_json: "[1,2]".to_string(),
            },
        )
        .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let request = data_request(
            Action::Update,
            Target::Catalog,
            &DataArgs {
                data_json: r#"{"productName":"W"}"#.to_string(),
            },
        )
        .expect("request");
        assert_eq!(request.data, json!({"productName": "W"}));
    }

    #[test]
    fn delete_request_wraps_product_name() {
        let request = delete_request(Target::Catalog, "Alpha");
        assert_eq!(request.action, Action::Delete);
        assert_eq!(request.data, json!({"productName": "Alpha"}));
    }

    #[test]
    fn inline_json_errors_are_usage() {
        let err = parse_inline_json("{oops").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().is_some());
    }

    #[test]
    fn unknown_subcommand_is_usage_error() {
        let (err, _) = run_with_args(args(&["shelfstore", "orders", "list"])).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().is_some());
    }

    #[test]
    fn clap_hint_names_the_subcommand() {
        let err = match Cli::try_parse_from(["shelfstore", "catalog", "delete"]) {
            Ok(_) => panic!("expected parse failure"),
            Err(err) => err,
        };
        assert_eq!(clap_error_hint(&err), "Try `shelfstore catalog delete --help`.");
    }

    #[test]
    fn error_json_carries_kind_hint_and_key() {
        let err = Error::new(ErrorKind::Corrupt)
            .with_message("products file must hold a JSON array")
            .with_hint("fix it")
            .with_key("products.json");
        assert_eq!(
            error_json(&err),
            json!({
                "error": {
                    "kind": "Corrupt",
                    "message": "products file must hold a JSON array",
                    "hint": "fix it",
                    "key": "products.json",
                }
            })
        );
    }

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::Usage).with_message("bad input");
        let colored = error_text(&err, true);
        let plain = error_text(&err, false);
        assert!(colored.contains("\u{1b}[31merror:\u{1b}[0m"));
        assert!(plain.contains("error:"));
        assert!(!plain.contains("\u{1b}["));
        assert!(!ColorMode::Never.use_color(true));
    }
}
