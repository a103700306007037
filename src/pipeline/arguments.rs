use crate::error::TgrunError;

const FROM_MODULE_NOT_ALLOWED: &str =
    "Option not allowed: {}.  tgrun will handle setting -from-module automatically.";

const POSITIONAL_NOT_ALLOWED: &str = "Argument not allowed: {}.  tgrun will handle setting the \
     module source and DIR arguments automatically.";

/// Reject user-supplied download arguments on an init invocation.
///
/// Only the init sub-invocation that downloads a module source may carry
/// `-from-module` or positional arguments; everywhere else every argument
/// after the command token must be an option without a module reference.
pub fn verify_source_download_arguments(
    allow_source_download: bool,
    args: &[String],
) -> Result<(), TgrunError> {
    if allow_source_download || args.len() <= 1 {
        return Ok(());
    }

    for arg in &args[1..] {
        if arg.contains("-from-module") {
            return Err(TgrunError::argument_not_allowed(arg, FROM_MODULE_NOT_ALLOWED));
        }

        if !arg.starts_with('-') {
            return Err(TgrunError::argument_not_allowed(arg, POSITIONAL_NOT_ALLOWED));
        }
    }

    Ok(())
}
