pub mod run;

use gossa_config::Config;
use gossa_runtime::{Driver, DriverBuilder, ExecOptions};

/// Driver configured from `settings`, with command-line switches on top.
pub(crate) fn driver_builder(settings: &Config, trace: bool, dump_instrs: bool) -> DriverBuilder {
    let options = ExecOptions {
        trace: trace || settings.trace(),
        disable_recover: settings.disable_recover(),
        dump_instrs,
    };
    Driver::builder().config(settings).options(options)
}
