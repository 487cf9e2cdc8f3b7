//! Libvirt `<interface>` XML for interface descriptors.
//!
//! The domain XML builder splices this element into `<devices>`.

use crate::descriptor::{InterfaceDescriptor, NetType};

/// Builder for a libvirt interface element.
pub struct InterfaceXmlBuilder<'a> {
    desc: &'a InterfaceDescriptor,
}

impl<'a> InterfaceXmlBuilder<'a> {
    pub fn new(desc: &'a InterfaceDescriptor) -> Self {
        Self { desc }
    }

    /// Build the interface XML string.
    pub fn build(&self) -> String {
        let desc = self.desc;
        let mut xml = format!("    <interface type='{}'>\n", desc.net_type.as_str());

        xml.push_str(&format!("      <mac address='{}'/>\n", escape(&desc.mac_address)));

        if let Some(model) = &desc.model {
            xml.push_str(&format!("      <model type='{}'/>\n", escape(model)));
        }
        if let Some(driver) = &desc.driver_hint {
            xml.push_str(&format!("      <driver name='{}'/>\n", escape(driver)));
        }

        xml.push_str(&self.build_source());

        if desc.net_type == NetType::Ethernet {
            xml.push_str("      <script path=''/>\n");
        }
        if let Some(dev) = &desc.target_device {
            xml.push_str(&format!("      <target dev='{}'/>\n", escape(dev)));
        }

        xml.push_str(&self.build_virtualport());
        xml.push_str(&self.build_filterref());

        xml.push_str("    </interface>\n");
        xml
    }

    fn build_source(&self) -> String {
        let desc = self.desc;
        match desc.net_type {
            NetType::Bridge => desc
                .bridge_name
                .as_ref()
                .map(|br| format!("      <source bridge='{}'/>\n", escape(br)))
                .unwrap_or_default(),
            NetType::Direct => match (&desc.direct_device, desc.direct_mode) {
                (Some(dev), Some(mode)) => format!(
                    "      <source dev='{}' mode='{}'/>\n",
                    escape(dev),
                    mode.as_str()
                ),
                (Some(dev), None) => format!("      <source dev='{}'/>\n", escape(dev)),
                _ => String::new(),
            },
            NetType::Ethernet => String::new(),
        }
    }

    fn build_virtualport(&self) -> String {
        let Some(port_type) = &self.desc.virtual_port_type else {
            return String::new();
        };

        if self.desc.virtual_port_params.is_empty() {
            return format!("      <virtualport type='{}'/>\n", escape(port_type));
        }

        let params: String = self
            .desc
            .virtual_port_params
            .iter()
            .map(|p| format!(" {}='{}'", p.name, escape(&p.value)))
            .collect();

        format!(
            r#"      <virtualport type='{}'>
        <parameters{}/>
      </virtualport>
"#,
            escape(port_type),
            params
        )
    }

    fn build_filterref(&self) -> String {
        let Some(filter) = &self.desc.filter_name else {
            return String::new();
        };

        if self.desc.filter_params.is_empty() {
            return format!("      <filterref filter='{}'/>\n", escape(filter));
        }

        let mut xml = format!("      <filterref filter='{}'>\n", escape(filter));
        for p in &self.desc.filter_params {
            xml.push_str(&format!(
                "        <parameter name='{}' value='{}'/>\n",
                escape(&p.name),
                escape(&p.value)
            ));
        }
        xml.push_str("      </filterref>\n");
        xml
    }
}

/// Escape a value for a single-quoted XML attribute.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
