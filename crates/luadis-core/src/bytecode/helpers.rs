//! Helper validations reused by tooling.

use crate::{DecodeError, DecodeResult, Module};

/// Structural validation of a decoded module.
///
/// Decoding does not call this: a module whose indices point nowhere still
/// disassembles. Tooling runs it in strict mode to reject such input.
pub fn validate_module(module: &Module) -> DecodeResult<()> {
    let count = module.protos.len();

    if module.main as usize >= count {
        return Err(DecodeError::invalid(format!(
            "entry proto {} out of range ({count} protos)",
            module.main
        )));
    }

    for (id, proto) in module.protos.iter().enumerate() {
        for &child in &proto.children {
            if child as usize >= count {
                return Err(DecodeError::invalid(format!(
                    "proto #{id} references child {child} but module holds {count} protos"
                )));
            }
            if child as usize == id {
                return Err(DecodeError::invalid(format!("proto #{id} lists itself as a child")));
            }
        }
    }

    Ok(())
}

/// Prototypes with no instructions at all.
pub fn empty_protos(module: &Module) -> Vec<usize> {
    module
        .protos
        .iter()
        .enumerate()
        .filter(|(_, p)| p.code.is_empty())
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Proto;

    fn module(children: &[&[u32]], main: u32) -> Module {
        let protos = children
            .iter()
            .map(|c| Proto { code: vec![0], children: c.to_vec(), ..Proto::default() })
            .collect();
        Module { version: 2, protos, main }
    }

    #[test]
    fn accepts_well_formed_tree() {
        assert_eq!(validate_module(&module(&[&[], &[]], 1)), Ok(()));
        assert_eq!(validate_module(&module(&[&[], &[0]], 1)), Ok(()));
    }

    #[test]
    fn rejects_out_of_range_child() {
        let err = validate_module(&module(&[&[5]], 0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid module: proto #0 references child 5 but module holds 1 protos"
        );
    }

    #[test]
    fn rejects_self_reference_and_bad_main() {
        assert!(validate_module(&module(&[&[0]], 0)).is_err());
        assert!(validate_module(&module(&[&[]], 1)).is_err());
        assert!(validate_module(&Module::default()).is_err());
    }

    #[test]
    fn lists_empty_protos() {
        let mut m = module(&[&[], &[]], 0);
        m.protos[1].code.clear();
        assert_eq!(empty_protos(&m), vec![1]);
    }
}
