use anyhow::{Result, anyhow};
use nicplan::{Adapter, AdapterInventory, ApplyError, CommandSink, NetCommand, apply_document};

const DOCUMENT: &str = "\
version: 2
ethernets:
  eth0:
    match:
      macaddress: AA:BB:CC:DD:EE:FF
    set-name: \"LAN\"
    addresses:
      - 10.0.0.5/24
      - fd00::5/64
    routes:
      - to: 0.0.0.0/0
        via: 10.0.0.1
    nameservers:
      addresses: [8.8.8.8, 1.1.1.1]
    mtu: 1400
";

#[derive(Default)]
struct Host {
    adapters: Vec<Adapter>,
    renames: Vec<(String, String)>,
}

impl Host {
    fn with(adapters: &[(&str, &str)]) -> Self {
        Host {
            adapters: adapters
                .iter()
                .enumerate()
                .map(|(i, (name, mac))| Adapter::new(name, mac, &(i + 1).to_string()))
                .collect(),
            renames: Vec::new(),
        }
    }
}

impl AdapterInventory for Host {
    fn list_adapters(&self) -> Result<Vec<Adapter>> {
        Ok(self.adapters.clone())
    }

    fn rename_adapter(&mut self, current: &str, new: &str) -> Result<()> {
        let adapter = self
            .adapters
            .iter_mut()
            .find(|a| a.name == current)
            .ok_or_else(|| anyhow!("no adapter named {current}"))?;
        adapter.name = new.to_string();
        self.renames.push((current.to_string(), new.to_string()));
        Ok(())
    }

    fn adapter_exists(&self, name: &str) -> bool {
        self.adapters.iter().any(|a| a.name == name)
    }
}

#[derive(Default)]
struct Recorder(Vec<(String, NetCommand)>);

impl CommandSink for Recorder {
    fn execute(&mut self, adapter: &str, command: &NetCommand) -> Result<()> {
        self.0.push((adapter.to_string(), command.clone()));
        Ok(())
    }
}

fn expected_commands() -> Vec<NetCommand> {
    vec![
        NetCommand::SetDhcp,
        NetCommand::ResetIpv6,
        NetCommand::AddAddressV4 {
            address: "10.0.0.5".to_string(),
            netmask: "255.255.255.0".to_string(),
        },
        NetCommand::AddAddressV6 {
            address: "fd00::5/64".to_string(),
        },
        NetCommand::AddRouteV4 {
            destination: "0.0.0.0/0".to_string(),
            gateway: Some("10.0.0.1".to_string()),
            metric: None,
        },
        NetCommand::SetPrimaryDns {
            server: "8.8.8.8".to_string(),
        },
        NetCommand::AddDns {
            server: "1.1.1.1".to_string(),
            index: 2,
        },
        NetCommand::SetMtu(1400),
    ]
}

#[test]
fn renames_and_configures_matching_adapter() {
    let mut host = Host::with(&[("Ethernet", "aa-bb-cc-dd-ee-ff")]);
    let mut sink = Recorder::default();

    let report = apply_document(DOCUMENT, &mut host, &mut sink).expect("document should apply");

    assert_eq!(
        host.renames,
        vec![("Ethernet".to_string(), "LAN".to_string())]
    );
    assert!(sink.0.iter().all(|(adapter, _)| adapter == "LAN"));
    let commands: Vec<NetCommand> = sink.0.into_iter().map(|(_, c)| c).collect();
    assert_eq!(commands, expected_commands());

    assert!(report.is_clean());
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].adapter, "LAN");
    assert_eq!(report.results[0].executed, 8);
    assert_eq!(
        report.to_string(),
        "1/1 interface(s) applied cleanly, 0 rejected, 0 failure(s)"
    );
}

#[test]
fn second_run_skips_rename_and_repeats_configuration() {
    let mut host = Host::with(&[("Ethernet", "AA:BB:CC:DD:EE:FF")]);
    let mut first = Recorder::default();
    apply_document(DOCUMENT, &mut host, &mut first).expect("first run should apply");

    let mut second = Recorder::default();
    let report = apply_document(DOCUMENT, &mut host, &mut second).expect("rerun should apply");

    assert_eq!(host.renames.len(), 1);
    assert!(report.is_clean());
    assert_eq!(first.0, second.0);
}

#[test]
fn unmatched_interface_does_not_stop_others() {
    let document = "\
ethernets:
  eth0:
    match:
      macaddress: 00:11:22:33:44:55
    set-name: WAN
  eth1:
    match:
      macaddress: aa:bb:cc:dd:ee:ff
    mtu: 9000
";
    let mut host = Host::with(&[("Ethernet 2", "AA-BB-CC-DD-EE-FF")]);
    let mut sink = Recorder::default();

    let report = apply_document(document, &mut host, &mut sink).expect("document should apply");

    assert!(host.renames.is_empty());
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].interface, "eth1");
    assert!(matches!(
        report.unmatched.as_slice(),
        [ApplyError::NoMatchingAdapter { interface, .. }] if interface == "eth0"
    ));
    assert_eq!(
        sink.0.last(),
        Some(&("Ethernet 2".to_string(), NetCommand::SetMtu(9000)))
    );
    assert!(!report.is_clean());
}

#[test]
fn interfaces_sharing_an_adapter_follow_its_rename() {
    let document = "\
ethernets:
  eth0:
    match:
      macaddress: AA-BB-CC-DD-EE-FF
    mtu: 1400
  eth1:
    match:
      macaddress: aa:bb:cc:dd:ee:ff
    set-name: LAN
";
    let mut host = Host::with(&[("Ethernet", "aa:bb:cc:dd:ee:ff")]);
    let mut sink = Recorder::default();

    let report = apply_document(document, &mut host, &mut sink).expect("document should apply");

    assert_eq!(
        host.renames,
        vec![("Ethernet".to_string(), "LAN".to_string())]
    );
    assert!(report.is_clean());
    assert_eq!(report.results[1].interface, "eth0");
    assert_eq!(report.results[1].adapter, "LAN");
    let targets: Vec<&str> = sink.0.iter().map(|(adapter, _)| adapter.as_str()).collect();
    assert_eq!(targets, vec!["LAN"; 5]);
}

#[test]
fn document_without_ethernets_is_rejected() {
    let mut host = Host::default();
    let mut sink = Recorder::default();
    let err = apply_document("version: 2\n", &mut host, &mut sink)
        .expect_err("missing section should fail");
    assert!(matches!(err, nicplan::ConfigError::MissingSection(_)));
    assert!(sink.0.is_empty());
}
