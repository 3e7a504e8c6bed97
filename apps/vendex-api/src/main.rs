use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = vendex_api::Args::parse();

	vendex_api::run(args).await
}
