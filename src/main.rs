use anyhow::Result;
use brotzoom::RenderError;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init();

    let cfg = brotzoom::config::Config::parse();
    let res = if cfg.probe {
        brotzoom::app::print_probe(&cfg)
    } else {
        brotzoom::app::run(cfg)
    };
    if let Err(err) = &res {
        if let Some(render_err) = err.downcast_ref::<RenderError>() {
            eprintln!("error [{}]", render_err.kind());
        }
    }
    res
}
