use plotkit::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let plan_path = std::env::args().nth(1);
    plotkit::run(plan_path.as_deref()).await
}
