use std::process::ExitCode;

fn main() -> ExitCode {
    mfcc_cache_lib::run()
}
