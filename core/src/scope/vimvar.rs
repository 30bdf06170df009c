use once_cell::sync::Lazy;

use crate::util::fast_map::{FastHashMap, fast_hash_map_with_capacity};

/// Read-only.
pub(crate) const VV_RO: u8 = 0x01;
/// Read-only while the sandbox is active.
pub(crate) const VV_RO_SBX: u8 = 0x02;
/// Also reachable without the `v:` prefix.
pub(crate) const VV_COMPAT: u8 = 0x04;

pub(crate) const VEX_VERSION: i64 = 704;

#[derive(Debug, Clone, Copy)]
pub(crate) enum VimVarInit {
    Number(i64),
    Str(&'static str),
    List,
    /// Only present while some operation gives it a meaning (`v:key`, `v:val`).
    Absent,
}

#[derive(Debug)]
pub(crate) struct VimVarDef {
    pub name: &'static str,
    pub init: VimVarInit,
    pub flags: u8,
}

const fn vv(name: &'static str, init: VimVarInit, flags: u8) -> VimVarDef {
    VimVarDef { name, init, flags }
}

use VimVarInit::{Absent, List, Number, Str};

pub(crate) static VIMVARS: &[VimVarDef] = &[
    vv("count", Number(0), VV_COMPAT | VV_RO),
    vv("count1", Number(1), VV_RO),
    vv("prevcount", Number(0), VV_RO),
    vv("errmsg", Str(""), VV_COMPAT),
    vv("warningmsg", Str(""), 0),
    vv("statusmsg", Str(""), 0),
    vv("shell_error", Number(0), VV_COMPAT | VV_RO),
    vv("this_session", Str(""), VV_COMPAT),
    vv("version", Number(VEX_VERSION), VV_COMPAT | VV_RO),
    vv("lnum", Number(0), VV_RO_SBX),
    vv("termresponse", Str(""), VV_RO),
    vv("fname", Str(""), VV_RO),
    vv("lang", Str(""), VV_RO),
    vv("ctype", Str(""), VV_RO),
    vv("key", Absent, VV_RO),
    vv("val", Absent, VV_RO),
    vv("exception", Str(""), VV_RO),
    vv("throwpoint", Str(""), VV_RO),
    vv("register", Str("\""), VV_RO),
    vv("cmdbang", Number(0), VV_RO),
    vv("char", Str(""), 0),
    vv("progname", Str("vex"), VV_RO),
    vv("dying", Number(0), VV_RO),
    vv("oldfiles", List, 0),
    vv("searchforward", Number(1), 0),
    vv("hlsearch", Number(0), 0),
    vv("profiling", Number(0), VV_RO),
];

static VIMVAR_INDEX: Lazy<FastHashMap<&'static str, usize>> = Lazy::new(|| {
    let mut map = fast_hash_map_with_capacity(VIMVARS.len());
    for (idx, def) in VIMVARS.iter().enumerate() {
        map.insert(def.name, idx);
    }
    map
});

pub(crate) fn vimvar_def(name: &str) -> Option<&'static VimVarDef> {
    VIMVAR_INDEX.get(name).map(|&idx| &VIMVARS[idx])
}

/// Old-style names such as `count` that mean `v:count` in every scope.
pub(crate) fn is_compat_name(name: &str) -> bool {
    vimvar_def(name).is_some_and(|def| def.flags & VV_COMPAT != 0)
}
