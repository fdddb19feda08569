//! Login shell environment.
//!
//! Every session gets colour-forcing variables and a `BASH_ENV` rc file with
//! coloured aliases and prompt, so tools behave as they would in a local
//! terminal emulator.

pub const RC_CONTENT: &str = r#"
# enable color support
alias ls='ls --color=auto'
alias grep='grep --color=auto'
alias dir='dir --color=auto'
alias vdir='vdir --color=auto'
alias diff='diff --color=auto'
alias ip='ip --color=auto'
# update PS1 prompt with color
export PS1='\[\033[01;32m\]\u@\h\[\033[00m\]:\[\033[01;34m\]\w\[\033[00m\]\$ '

"#;

pub const FORCED_ENV: &[(&str, &str)] = &[
    ("TERM", "xterm-256color"),
    ("COLORTERM", "truecolor"),
    ("FORCE_COLOR", "true"),
    ("LANG", "en_US.UTF-8"),
    ("LC_ALL", "en_US.UTF-8"),
    ("CLICOLOR", "1"),
    ("CLICOLOR_FORCE", "1"),
    (
        "LS_COLORS",
        "rs=0:di=01;34:ln=01;36:mh=00:pi=40;33:so=01;35:do=01;35:bd=40;33;01:cd=40;33;01:or=40;31;01:mi=00:su=37;41:sg=30;43:ca=30;41:tw=30;42:ow=34;42:st=37;44:ex=01;32",
    ),
];

pub const LOGIN_ARGS: &[&str] = &["-l"];

/// Environment for a session shell, later entries overriding earlier ones.
pub fn session_env(
    user: &str,
    home: &str,
    path: Option<String>,
    rc_file: &str,
) -> Vec<(String, String)> {
    let mut env = vec![
        ("USER".to_string(), user.to_string()),
        ("HOME".to_string(), home.to_string()),
        ("PATH".to_string(), path.unwrap_or_default()),
    ];
    env.extend(
        FORCED_ENV
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string())),
    );
    env.push(("BASH_ENV".to_string(), rc_file.to_string()));
    env
}
