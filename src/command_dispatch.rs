//! Purpose: Hold top-level CLI command dispatch for `shelfstore`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Reads print `{"content": ...}` or `{"data": [...]}`; mutations
//! print `{"success": true}`; failures are returned for `main` to report.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    context: RunContext,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "shelfstore", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            if context.remote.is_some() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--remote cannot be combined with serve")
                    .with_hint("Run serve without --remote; it always uses --dir."));
            }
            let config = serve_config_from_args(args, &context.data_dir, context.options)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::Catalog { command } => {
            let backend = Backend::open(&context)?;
            match command {
                CatalogCommand::Show => {
                    let content = backend.read_catalog()?;
                    emit_json(json!({ "content": content }));
                }
                CatalogCommand::Create(args) => {
                    backend.execute(&data_request(Action::Create, Target::Catalog, &args)?)?;
                    emit_json(json!({ "success": true }));
                }
                CatalogCommand::Update(args) => {
                    backend.execute(&data_request(Action::Update, Target::Catalog, &args)?)?;
                    emit_json(json!({ "success": true }));
                }
                CatalogCommand::Delete { product_name } => {
                    backend.execute(&delete_request(Target::Catalog, &product_name))?;
                    emit_json(json!({ "success": true }));
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Products { command } => {
            let backend = Backend::open(&context)?;
            match command {
                ProductsCommand::List => {
                    let records = backend.list_products()?;
                    emit_json(json!({ "data": records }));
                }
                ProductsCommand::Create(args) => {
                    backend.execute(&data_request(Action::Create, Target::Products, &args)?)?;
                    emit_json(json!({ "success": true }));
                }
                ProductsCommand::Update(args) => {
                    backend.execute(&data_request(Action::Update, Target::Products, &args)?)?;
                    emit_json(json!({ "success": true }));
                }
                ProductsCommand::Delete { product_name } => {
                    backend.execute(&delete_request(Target::Products, &product_name))?;
                    emit_json(json!({ "success": true }));
                }
            }
            Ok(RunOutcome::ok())
        }
    }
}
