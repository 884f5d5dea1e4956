//! XML (de)serialization of precursor lists
//!
//! Cached spectra keep their precursor information in the sidecar database as
//! an mzML-derived `precursorList` fragment, the same representation mzDB
//! files use in their `spectrum.precursor_list` column.
//!
//! # Example
//!
//! ```
//! use swath::model::Precursor;
//! use swath::xml::{parse_precursor_list, write_precursor_list};
//!
//! let xml = write_precursor_list(&[Precursor::new(412.5, 12.5, 12.5)]).unwrap();
//! let precursors = parse_precursor_list(&xml).unwrap();
//! assert_eq!(precursors[0].target_mz, 412.5);
//! ```

use anyhow_ext::Result;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node};

use crate::model::Precursor;

const ISOLATION_TARGET_MZ: &str = "MS:1000827";
const ISOLATION_LOWER_OFFSET: &str = "MS:1000828";
const ISOLATION_UPPER_OFFSET: &str = "MS:1000829";
const SELECTED_ION_MZ: &str = "MS:1000744";
const CHARGE_STATE: &str = "MS:1000041";
const COLLISION_ENERGY: &str = "MS:1000045";

/// Known activation methods (accession, name)
const ACTIVATION_TYPES: [(&str, &str); 6] = [
    ("MS:1000133", "collision-induced dissociation"),
    ("MS:1000422", "beam-type collision-induced dissociation"),
    ("MS:1000598", "electron transfer dissociation"),
    ("MS:1000599", "electron capture dissociation"),
    ("MS:1002631", "electron-transfer/higher-energy collision dissociation"),
    ("MS:1000435", "photodissociation"),
];

macro_rules! bstart {
    ($e:expr) => {
        BytesStart::new($e)
    };
}

fn start(writer: &mut Writer<Vec<u8>>, tag: &str) -> Result<()> {
    writer.write_event(Event::Start(bstart!(tag)))?;
    Ok(())
}

fn end(writer: &mut Writer<Vec<u8>>, tag: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_cv_param(writer: &mut Writer<Vec<u8>>, accession: &str, name: &str, value: Option<String>) -> Result<()> {
    let mut elt = bstart!("cvParam");
    elt.push_attribute(("cvRef", "MS"));
    elt.push_attribute(("accession", accession));
    elt.push_attribute(("name", name));
    if let Some(v) = value.as_deref() {
        elt.push_attribute(("value", v));
    }
    writer.write_event(Event::Empty(elt))?;
    Ok(())
}

fn write_precursor(writer: &mut Writer<Vec<u8>>, prec: &Precursor) -> Result<()> {
    start(writer, "precursor")?;

    start(writer, "isolationWindow")?;
    write_cv_param(writer, ISOLATION_TARGET_MZ, "isolation window target m/z", Some(prec.target_mz.to_string()))?;
    write_cv_param(writer, ISOLATION_LOWER_OFFSET, "isolation window lower offset", Some(prec.lower_offset.to_string()))?;
    write_cv_param(writer, ISOLATION_UPPER_OFFSET, "isolation window upper offset", Some(prec.upper_offset.to_string()))?;
    end(writer, "isolationWindow")?;

    if prec.selected_ion_mz.is_some() || prec.charge.is_some() {
        let mut list = bstart!("selectedIonList");
        list.push_attribute(("count", "1"));
        writer.write_event(Event::Start(list))?;
        start(writer, "selectedIon")?;
        if let Some(mz) = prec.selected_ion_mz {
            write_cv_param(writer, SELECTED_ION_MZ, "selected ion m/z", Some(mz.to_string()))?;
        }
        if let Some(charge) = prec.charge {
            write_cv_param(writer, CHARGE_STATE, "charge state", Some(charge.to_string()))?;
        }
        end(writer, "selectedIon")?;
        end(writer, "selectedIonList")?;
    }

    if prec.collision_energy.is_some() || prec.activation_type.is_some() {
        start(writer, "activation")?;
        if let Some(ce) = prec.collision_energy {
            write_cv_param(writer, COLLISION_ENERGY, "collision energy", Some(ce.to_string()))?;
        }
        if let Some(act) = prec.activation_type.as_deref() {
            match ACTIVATION_TYPES.iter().find(|(_, name)| *name == act) {
                Some((accession, name)) => write_cv_param(writer, accession, name, None)?,
                None => {
                    let mut param = bstart!("userParam");
                    param.push_attribute(("name", act));
                    writer.write_event(Event::Empty(param))?;
                }
            }
        }
        end(writer, "activation")?;
    }

    end(writer, "precursor")
}

/// Serialize precursors into a `precursorList` XML fragment
pub fn write_precursor_list(precursors: &[Precursor]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());

    let count = precursors.len().to_string();
    let mut list = bstart!("precursorList");
    list.push_attribute(("count", count.as_str()));
    writer.write_event(Event::Start(list))?;

    for prec in precursors {
        write_precursor(&mut writer, prec)?;
    }

    end(&mut writer, "precursorList")?;

    Ok(String::from_utf8(writer.into_inner())?)
}

fn cv_value<'a, 'input: 'a>(node: &Node<'a, 'input>, accession: &str) -> Option<&'a str> {
    node.children()
        .filter(|n| n.tag_name().name() == "cvParam")
        .find(|n| n.attribute("accession") == Some(accession))
        .and_then(|n| n.attribute("value"))
}

fn cv_f64(node: &Node, accession: &str) -> Option<f64> {
    cv_value(node, accession).and_then(|v| v.parse().ok())
}

fn child<'a, 'input: 'a>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.tag_name().name() == name)
}

/// Parse a `precursorList` XML fragment; an empty string yields no precursors
pub fn parse_precursor_list(xml: &str) -> Result<Vec<Precursor>> {
    if xml.trim().is_empty() {
        return Ok(Vec::new());
    }

    let doc = Document::parse(xml)?;
    let root = doc.root_element();

    let mut precursors = Vec::new();
    for prec_node in root.children().filter(|n| n.tag_name().name() == "precursor") {
        let mut precursor = Precursor::default();

        if let Some(iw_node) = child(&prec_node, "isolationWindow") {
            precursor.target_mz = cv_f64(&iw_node, ISOLATION_TARGET_MZ).unwrap_or(0.0);
            precursor.lower_offset = cv_f64(&iw_node, ISOLATION_LOWER_OFFSET).unwrap_or(0.0);
            precursor.upper_offset = cv_f64(&iw_node, ISOLATION_UPPER_OFFSET).unwrap_or(0.0);
        }

        if let Some(si_node) = child(&prec_node, "selectedIonList").and_then(|sil| child(&sil, "selectedIon")) {
            precursor.selected_ion_mz = cv_f64(&si_node, SELECTED_ION_MZ);
            precursor.charge = cv_value(&si_node, CHARGE_STATE).and_then(|v| v.parse().ok());
        }

        if let Some(act_node) = child(&prec_node, "activation") {
            precursor.collision_energy = cv_f64(&act_node, COLLISION_ENERGY);
            precursor.activation_type = act_node
                .children()
                .find_map(|n| match n.tag_name().name() {
                    "cvParam" => {
                        let accession = n.attribute("accession")?;
                        ACTIVATION_TYPES
                            .iter()
                            .find(|(acc, _)| *acc == accession)
                            .map(|(_, name)| name.to_string())
                    }
                    "userParam" => n.attribute("name").map(String::from),
                    _ => None,
                });
        }

        precursors.push(precursor);
    }

    Ok(precursors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_precursor_list() {
        let xml = r#"<precursorList count="1">
                <precursor spectrumRef="controllerType=0 controllerNumber=1 scan=1">
                    <isolationWindow>
                        <cvParam cvRef="MS" accession="MS:1000827" value="810.79" name="isolation window target m/z" />
                        <cvParam cvRef="MS" accession="MS:1000828" value="1.0" name="isolation window lower offset" />
                        <cvParam cvRef="MS" accession="MS:1000829" value="2.0" name="isolation window upper offset" />
                    </isolationWindow>
                    <selectedIonList count="1">
                        <selectedIon>
                            <cvParam cvRef="MS" accession="MS:1000744" value="810.79" name="selected ion m/z" />
                            <cvParam cvRef="MS" accession="MS:1000041" value="2" name="charge state" />
                        </selectedIon>
                    </selectedIonList>
                    <activation>
                        <cvParam cvRef="MS" accession="MS:1000045" value="35" name="collision energy" />
                        <cvParam cvRef="MS" accession="MS:1000133" name="collision-induced dissociation" />
                    </activation>
                </precursor>
            </precursorList>"#;

        let precursors = parse_precursor_list(xml).expect("failed to parse precursor list");
        assert_eq!(precursors.len(), 1);
        let prec = &precursors[0];
        assert_eq!(prec.target_mz, 810.79);
        assert_eq!(prec.lower_offset, 1.0);
        assert_eq!(prec.upper_offset, 2.0);
        assert_eq!(prec.selected_ion_mz, Some(810.79));
        assert_eq!(prec.charge, Some(2));
        assert_eq!(prec.collision_energy, Some(35.0));
        assert_eq!(prec.activation_type.as_deref(), Some("collision-induced dissociation"));
    }

    #[test]
    fn test_written_list_keeps_all_fields() {
        let prec = Precursor {
            target_mz: 437.5,
            lower_offset: 12.5,
            upper_offset: 12.5,
            selected_ion_mz: Some(437.5),
            charge: None,
            collision_energy: Some(27.0),
            activation_type: Some("vendor <custom> & \"tuned\" activation".to_string()),
        };
        let xml = write_precursor_list(&[prec.clone(), Precursor::new(462.5, 12.5, 12.5)]).unwrap();
        assert!(xml.starts_with(r#"<precursorList count="2">"#));
        assert!(xml.contains("&lt;custom&gt; &amp; &quot;tuned&quot;"));

        let parsed = parse_precursor_list(&xml).unwrap();
        assert_eq!(parsed, vec![prec, Precursor::new(462.5, 12.5, 12.5)]);
    }

    #[test]
    fn test_empty_and_invalid_input() {
        assert!(parse_precursor_list("").unwrap().is_empty());
        assert!(parse_precursor_list("<precursorList").is_err());
    }
}
