//! Default cache locations, overridable at build time by setting the
//! `NSSCASH_PASSWD_FILE` / `NSSCASH_GROUP_FILE` environment variables for
//! the compiler invocation.

pub const PASSWD_FILE: &str = match option_env!("NSSCASH_PASSWD_FILE") {
    Some(path) => path,
    None => "/etc/passwd.nsscash",
};

pub const GROUP_FILE: &str = match option_env!("NSSCASH_GROUP_FILE") {
    Some(path) => path,
    None => "/etc/group.nsscash",
};
