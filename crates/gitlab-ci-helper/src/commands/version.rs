use crate::commands::Version;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Source revision, injected at build time through `GIT_REVISION`.
const REVISION: Option<&str> = option_env!("GIT_REVISION");

fn render(extended: bool) -> String {
    if extended {
        format!("{VERSION} - {}", REVISION.unwrap_or("unknown"))
    } else {
        VERSION.to_owned()
    }
}

pub(crate) fn version(Version { extended }: Version) {
    println!("{}", render(extended));
}
