use super::ModuleConfig;
use crate::options::ExecutionOptions;
use crate::traits::FileSystem;
use std::path::Path;

/// Collect the extra arguments that apply to the command in `options`.
///
/// For each matching `extra_arguments` entry: its `arguments`, then a
/// `-var-file` for every required var file and for every optional var file
/// that exists. Relative var file paths resolve against the working directory.
pub fn filter_extra_args(
    fs: &dyn FileSystem,
    options: &ExecutionOptions,
    config: &ModuleConfig,
) -> Vec<String> {
    let command = options.first_arg();
    let mut args = Vec::new();

    for extra in config.extra_arguments() {
        if !extra.commands.iter().any(|c| c == command) {
            continue;
        }

        args.extend(extra.arguments.iter().cloned());

        for var_file in &extra.required_var_files {
            args.push(format!("-var-file={}", var_file));
        }

        for var_file in &extra.optional_var_files {
            let path = options.working_dir.join(Path::new(var_file));
            if fs.exists(&path) {
                args.push(format!("-var-file={}", var_file));
            }
        }
    }

    args
}
