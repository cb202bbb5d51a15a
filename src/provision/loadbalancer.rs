// file: src/provision/loadbalancer.rs
// version: 1.2.0
// guid: ac29d571-6e84-4b03-9f5a-17c8b2e64d90

//! HAProxy and Keepalived for the HA control plane
//!
//! Each master fronts the apiservers with a local HAProxy on the
//! load-balancer port while Keepalived floats the virtual IP between
//! them. The primary master starts as VRRP MASTER, the rest as BACKUP
//! with lower priority, and a health script drops a master whose
//! HAProxy dies.

use crate::config::{ClusterSpec, NodeSpec, APISERVER_PORT, LB_APISERVER_PORT};
use crate::error::InstallError;
use crate::installer::Shell;
use crate::Result;

const HAPROXY_CONFIG_PATH: &str = "/etc/haproxy/haproxy.cfg";
const KEEPALIVED_CONFIG_PATH: &str = "/etc/keepalived/keepalived.conf";
const NONLOCAL_BIND_CONF_PATH: &str = "/etc/sysctl.d/98-haproxy.conf";

const VRRP_VIRTUAL_ROUTER_ID: u8 = 51;
const VRRP_AUTH_PASS: &str = "k8s_vip";
const PRIMARY_PRIORITY: u8 = 100;
const BACKUP_PRIORITY: u8 = 90;

/// HAProxy config balancing the LB port across every apiserver
pub fn render_haproxy_config(master_ips: &[String]) -> String {
    let mut config = format!(
        r#"global
    log /dev/log local0
    maxconn 4096
    daemon

defaults
    mode tcp
    log global
    option tcplog
    timeout connect 5s
    timeout client 600s
    timeout server 600s

frontend k8s_api
    bind *:{lb_port}
    default_backend k8s_masters

backend k8s_masters
    balance roundrobin
    option tcp-check
"#,
        lb_port = LB_APISERVER_PORT
    );
    for (i, ip) in master_ips.iter().enumerate() {
        config.push_str(&format!(
            "    server cp{} {}:{} check\n",
            i + 1,
            ip,
            APISERVER_PORT
        ));
    }
    config
}

/// Keepalived config for one master. Identity comes from the node's
/// position in the master list; the primary claims MASTER state.
pub fn render_keepalived_config(spec: &ClusterSpec, node: &NodeSpec) -> Result<String> {
    let master_ips = spec.master_ips();
    let position = master_ips
        .iter()
        .position(|ip| *ip == node.ip)
        .ok_or_else(|| {
            InstallError::validation(format!("{} is not in the master list", node.ip))
        })?;
    let interface = node.interface.as_deref().ok_or_else(|| {
        InstallError::validation(format!(
            "keepalived needs an interface for master {}",
            node.ip
        ))
    })?;
    let (state, priority) = if node.is_primary_master {
        ("MASTER", PRIMARY_PRIORITY)
    } else {
        ("BACKUP", BACKUP_PRIORITY)
    };
    let peers: Vec<&String> = master_ips.iter().filter(|ip| **ip != node.ip).collect();

    let mut config = format!(
        r#"global_defs {{
    router_id K8S_CP_{position}
}}

vrrp_script chk_haproxy {{
    script "systemctl is-active --quiet haproxy"
    interval 2
    weight -20
}}

vrrp_instance VI_1 {{
    state {state}
    interface {interface}
    virtual_router_id {router_id}
    priority {priority}
    advert_int 1
    authentication {{
        auth_type PASS
        auth_pass {auth_pass}
    }}
    unicast_src_ip {src_ip}
    unicast_peer {{
"#,
        position = position + 1,
        state = state,
        interface = interface,
        router_id = VRRP_VIRTUAL_ROUTER_ID,
        priority = priority,
        auth_pass = VRRP_AUTH_PASS,
        src_ip = node.ip
    );
    for peer in peers {
        config.push_str(&format!("        {}\n", peer));
    }
    config.push_str(&format!(
        r#"    }}
    virtual_ipaddress {{
        {vip}
    }}
    track_script {{
        chk_haproxy
    }}
}}
"#,
        vip = spec.ha.virtual_ip
    ));
    Ok(config)
}

/// Both services active and configured for the current master set
pub async fn check_load_balancer(sh: &mut Shell<'_>) -> Result<bool> {
    for service in ["haproxy", "keepalived"] {
        match sh.probe(&format!("systemctl is-active {}", service)).await? {
            Some(state) if state == "active" => {}
            _ => return Ok(false),
        }
    }
    for ip in sh.spec.master_ips() {
        if !sh
            .probe_ok(&format!(
                "grep -q '{}:{}' {}",
                ip, APISERVER_PORT, HAPROXY_CONFIG_PATH
            ))
            .await?
        {
            return Ok(false);
        }
    }
    sh.probe_ok(&format!(
        "grep -q '{}' {}",
        sh.spec.virtual_ip_host(),
        KEEPALIVED_CONFIG_PATH
    ))
    .await
}

/// Write both configs, allow binding the floating VIP, start the services
pub async fn configure_load_balancer(sh: &mut Shell<'_>, node: &NodeSpec) -> Result<()> {
    let haproxy = render_haproxy_config(&sh.spec.master_ips());
    let keepalived = render_keepalived_config(sh.spec, node)?;
    sh.run("mkdir -p /etc/haproxy /etc/keepalived").await?;
    sh.write_file(HAPROXY_CONFIG_PATH, haproxy.as_bytes()).await?;
    sh.write_file(KEEPALIVED_CONFIG_PATH, keepalived.as_bytes())
        .await?;
    sh.write_file(NONLOCAL_BIND_CONF_PATH, b"net.ipv4.ip_nonlocal_bind = 1\n")
        .await?;
    sh.run("sysctl --system").await?;
    sh.run("systemctl enable haproxy keepalived && systemctl restart haproxy keepalived")
        .await?;
    Ok(())
}
