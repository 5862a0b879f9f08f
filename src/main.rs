mod core;
mod ui;
mod utils;
mod workers;

use workers::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::load()?;

    let data_dir = utils::data_dir::resolve(args.data_dir.as_deref())?;

    // Logs go to a file only; stdout carries the conversation.
    utils::logging::init(args.verbose, &utils::data_dir::log_file(&data_dir))?;

    ui::run(args).await
}
