//! 逐步检查一次 dMRI 采集: 加载, 概览, 马赛克可视化, 持久化.

mod report;
mod runner;

fn main() {
    utils::init_logger();
    match runner::run() {
        Ok(report) => report.analyze(),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }
}
