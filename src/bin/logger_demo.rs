use tessera::logger::*;

fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    trace!("bootstrap trace log");
    debug!("bootstrap debug log");
    info!("bootstrap info log");

    logger.reload_filter("debug")?;
    trace!("application trace log");
    debug!("application debug log");
    info!("application info log");

    Ok(())
}
