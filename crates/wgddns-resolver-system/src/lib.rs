// # System Resolver
//
// This crate resolves hostnames through the platform `getaddrinfo(3)`, so
// `/etc/hosts`, nsswitch and the system DNS configuration all apply. No
// caching or retrying happens here; the polling loop is the retry.
//
// ## Classification
//
// `EAI_NONAME` (and `EAI_NODATA` where it exists) mean the name has no
// address records and map to `Error::HostNotFound`. Every other failure is
// `Error::Resolution`.
//
// ## Blocking
//
// `getaddrinfo` blocks, so each lookup runs on tokio's blocking pool.

use async_trait::async_trait;
use std::ffi::{CStr, CString};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::ptr;
use wgddns_core::traits::Resolver;
use wgddns_core::{Error, Result};

#[cfg(target_os = "linux")]
const EAI_NODATA: libc::c_int = -5;

/// Hostname resolver backed by `getaddrinfo(3)`
#[derive(Debug, Clone)]
pub struct SystemResolver {
    /// Only return families that have a configured non-loopback address
    addrconfig: bool,
}

impl SystemResolver {
    /// Create a resolver with `AI_ADDRCONFIG` enabled
    pub fn new() -> Self {
        Self { addrconfig: true }
    }

    /// Enable or disable `AI_ADDRCONFIG`
    pub fn with_addrconfig(mut self, addrconfig: bool) -> Self {
        self.addrconfig = addrconfig;
        self
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, hostname: &str) -> Result<Vec<SocketAddr>> {
        let host = CString::new(hostname)
            .map_err(|_| Error::resolution(format!("hostname contains a NUL byte: {:?}", hostname)))?;
        let flags = self.flags();

        tokio::task::spawn_blocking(move || lookup(&host, flags))
            .await
            .map_err(|e| Error::resolution(format!("resolver task failed: {}", e)))?
    }

    fn resolver_name(&self) -> &'static str {
        "getaddrinfo"
    }
}

impl SystemResolver {
    fn flags(&self) -> libc::c_int {
        let mut flags = libc::AI_V4MAPPED;
        if self.addrconfig {
            flags |= libc::AI_ADDRCONFIG;
        }
        flags
    }
}

/// Owned `addrinfo` list, freed on drop
struct AddrInfoList(*mut libc::addrinfo);

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: the pointer came from a successful getaddrinfo call and is freed once.
            unsafe { libc::freeaddrinfo(self.0) };
        }
    }
}

fn lookup(host: &CStr, flags: libc::c_int) -> Result<Vec<SocketAddr>> {
    // SAFETY: addrinfo is a plain C struct; all-zero is a valid "no hints" value.
    let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
    hints.ai_family = libc::AF_UNSPEC;
    hints.ai_socktype = 0;
    hints.ai_protocol = 0;
    hints.ai_flags = flags;

    let mut result: *mut libc::addrinfo = ptr::null_mut();
    // SAFETY: host is NUL-terminated, service is NULL, hints and result are valid pointers.
    let rc = unsafe { libc::getaddrinfo(host.as_ptr(), ptr::null(), &hints, &mut result) };
    let list = AddrInfoList(result);

    if rc != 0 {
        return Err(classify(rc, &host.to_string_lossy()));
    }

    let mut addresses = Vec::new();
    let mut cursor = list.0;
    while !cursor.is_null() {
        // SAFETY: cursor walks the list getaddrinfo returned; `list` keeps it alive.
        let info = unsafe { &*cursor };
        cursor = info.ai_next;

        if info.ai_addr.is_null() {
            continue;
        }

        match info.ai_family {
            libc::AF_INET => {
                // SAFETY: ai_family says ai_addr points at a sockaddr_in.
                let sin = unsafe { &*(info.ai_addr as *const libc::sockaddr_in) };
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                addresses.push(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))));
            }
            libc::AF_INET6 => {
                // SAFETY: ai_family says ai_addr points at a sockaddr_in6.
                let sin6 = unsafe { &*(info.ai_addr as *const libc::sockaddr_in6) };
                let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                addresses.push(SocketAddr::V6(SocketAddrV6::new(
                    ip,
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                )));
            }
            family => {
                tracing::error!(
                    location = concat!(file!(), ":", line!()),
                    "Invalid socket family from getaddrinfo: {}",
                    family
                );
                return Err(Error::resolution(format!(
                    "getaddrinfo returned unsupported address family {}",
                    family
                )));
            }
        }
    }

    Ok(addresses)
}

/// Map a non-zero `getaddrinfo` return code onto the error taxonomy
fn classify(rc: libc::c_int, hostname: &str) -> Error {
    if is_no_records(rc) {
        return Error::host_not_found(hostname);
    }

    if rc == libc::EAI_SYSTEM {
        return Error::resolution(format!(
            "getaddrinfo({}): {}",
            hostname,
            std::io::Error::last_os_error()
        ));
    }

    Error::resolution(format!("getaddrinfo({}): {}", hostname, gai_message(rc)))
}

fn is_no_records(rc: libc::c_int) -> bool {
    #[cfg(target_os = "linux")]
    if rc == EAI_NODATA {
        return true;
    }

    rc == libc::EAI_NONAME
}

fn gai_message(rc: libc::c_int) -> String {
    // SAFETY: gai_strerror returns a pointer to a static NUL-terminated string.
    let message = unsafe { libc::gai_strerror(rc) };
    if message.is_null() {
        return format!("error {}", rc);
    }
    unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
}
