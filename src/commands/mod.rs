pub type CmdResult<T> = bob::Result<(T, i32)>;

pub mod build;
pub mod plan;

macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args))
    };
}

pub(crate) fn run_json(command: crate::Commands) -> (bob::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Build(args) => dispatch!(args, build),
        crate::Commands::Plan(args) => dispatch!(args, plan),
    }
}
