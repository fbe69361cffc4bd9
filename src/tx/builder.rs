//! Spend Builder
//!
//! Turns a JSON-level [`SpendRequest`] into a fully signed one-input
//! Taproot transaction, and a [`TaprootOutputSpec`] into its commitments.

use crate::crypto::curve::XOnlyPubKey;
use crate::crypto::taproot::TaprootSpendInfo;
use crate::crypto::taptree::{TapLeaf, TapTree};
use crate::error::{TaprootError, TaprootResult};
use crate::tx::codec::{OutPoint, TxInput, TxOutput, UnsignedTransaction};
use crate::tx::sighash::TaprootSighasher;
use crate::tx::signer::TaprootInputSigner;
use crate::tx::witness::ControlBlock;
use crate::types::*;
use crate::utils::config::SigningConfig;
use crate::{log_debug, log_info, log_warn};

/// Largest amount a single output may carry, in satoshis
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Parse the leaf scripts of `spec` and commit them under its internal key
///
/// No leaves gives a key-path-only output. Without an explicit shape the
/// leaves are paired into a balanced tree in the order given.
pub fn derive_output(
    signer: &TaprootInputSigner,
    spec: &TaprootOutputSpec,
    leaf_version: u8,
) -> TaprootResult<(TaprootSpendInfo, Vec<TapLeaf>)> {
    let internal_key = XOnlyPubKey::from_hex(&spec.internal_key)?;

    let leaves = spec
        .leaves
        .iter()
        .map(|script| TapLeaf::with_version(leaf_version, hex::decode(script.trim())?))
        .collect::<TaprootResult<Vec<_>>>()?;

    let info = match (leaves.is_empty(), &spec.tree) {
        (true, None) => TaprootSpendInfo::key_path_only(signer.tweaker(), internal_key)?,
        (true, Some(_)) => {
            return Err(TaprootError::InvalidTree(
                "tree shape given without leaves".to_string(),
            ))
        }
        (false, None) => {
            let tree = TapTree::balanced(leaves.clone())?;
            TaprootSpendInfo::with_tree(signer.tweaker(), internal_key, tree)?
        }
        (false, Some(shape)) => {
            let tree = TapTree::from_shape(shape, &leaves)?;
            TaprootSpendInfo::with_tree(signer.tweaker(), internal_key, tree)?
        }
    };

    log_debug!(
        "builder",
        "Derived output key",
        leaves = leaves.len(),
        output_key = info.output_key().to_hex(),
        tweak = hex::encode(info.tweak())
    );

    Ok((info, leaves))
}

/// Commitment report for a derived output
pub fn derive_report(info: &TaprootSpendInfo, leaves: &[TapLeaf]) -> TaprootResult<DeriveReport> {
    let leaf_reports = match info.tree() {
        Some(tree) => leaves
            .iter()
            .enumerate()
            .map(|(index, leaf)| {
                let id = tree.find_leaf(leaf).ok_or_else(|| {
                    TaprootError::InvalidTree(format!("leaf {} missing from tree", index))
                })?;
                let control_block = ControlBlock::for_leaf(info, leaf)?;
                Ok(LeafReport {
                    index,
                    leaf_hash: hex::encode(leaf.hash()),
                    depth: tree.depth(id)?,
                    control_block: hex::encode(control_block.serialize()),
                })
            })
            .collect::<TaprootResult<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(DeriveReport {
        internal_key: info.internal_key().to_hex(),
        merkle_root: info.merkle_root().map(|root| root.to_hex()),
        tweak: hex::encode(info.tweak()),
        output_key: info.output_key().to_hex(),
        parity: info.parity(),
        script_pubkey: hex::encode(info.script_pubkey()),
        leaves: leaf_reports,
    })
}

/// Derive `spec` and report its commitments
pub fn derive(spec: &TaprootOutputSpec, config: &SigningConfig) -> TaprootResult<DeriveReport> {
    let signer = TaprootInputSigner::new();
    let (info, leaves) = derive_output(&signer, spec, config.leaf_version)?;
    derive_report(&info, &leaves)
}

fn parse_outputs(outputs: &[OutputSpec]) -> TaprootResult<(Vec<TxOutput>, u64)> {
    if outputs.is_empty() {
        return Err(TaprootError::InvalidAmount("transaction has no outputs".to_string()));
    }

    let mut total: u64 = 0;
    let mut parsed = Vec::with_capacity(outputs.len());
    for (i, output) in outputs.iter().enumerate() {
        if output.amount_sats > MAX_MONEY {
            return Err(TaprootError::InvalidAmount(format!(
                "output {} amount {} exceeds the money supply",
                i, output.amount_sats
            )));
        }
        total = total
            .checked_add(output.amount_sats)
            .ok_or_else(|| TaprootError::InvalidAmount("output total overflows".to_string()))?;
        parsed.push(TxOutput::new(
            output.amount_sats,
            hex::decode(output.script_pubkey.trim())?,
        ));
    }
    Ok((parsed, total))
}

fn parse_aux_rand(hex_str: &str) -> TaprootResult<[u8; 32]> {
    let bytes = hex::decode(hex_str.trim())?;
    bytes.as_slice().try_into().map_err(|_| {
        TaprootError::ParseError(format!("aux_rand must be 32 bytes, got {}", bytes.len()))
    })
}

/// Build and sign a one-input spend of the output described by `request`
pub fn build_spend(request: &SpendRequest, config: &SigningConfig) -> TaprootResult<SpendReport> {
    let signer = TaprootInputSigner::new();
    let (info, leaves) = derive_output(&signer, &request.output, config.leaf_version)?;

    let prevout_value = request.prevout.amount_sats;
    if prevout_value > MAX_MONEY {
        return Err(TaprootError::InvalidAmount(format!(
            "prevout amount {} exceeds the money supply",
            prevout_value
        )));
    }
    let (outputs, output_total) = parse_outputs(&request.outputs)?;
    if output_total > prevout_value {
        return Err(TaprootError::InvalidAmount(format!(
            "outputs spend {} sats but the prevout holds {}",
            output_total, prevout_value
        )));
    }
    let fee = prevout_value - output_total;
    if fee == 0 {
        log_warn!("builder", "Spend pays no fee", prevout_sats = prevout_value);
    }

    let mut input = TxInput::new(OutPoint::from_hex(&request.prevout.txid, request.prevout.vout)?);
    if let Some(sequence) = request.prevout.sequence {
        input = input.with_sequence(sequence);
    }
    let mut tx = UnsignedTransaction::new(vec![input], outputs);
    tx.locktime = request.locktime;

    let prevouts = vec![TxOutput::new(prevout_value, info.script_pubkey())];
    let sighasher = TaprootSighasher::new(&tx, &prevouts)?;

    let hash_type = request.sighash_type.unwrap_or(config.sighash_type);
    let aux_rand = match &request.aux_rand {
        Some(aux) => parse_aux_rand(aux)?,
        None => config.aux_rand.generate(),
    };

    let (spend_path, sighash, signature, leaf_hash, control_block, witness) = match &request.spend
    {
        SpendPathRequest::KeyPath { private_key } => {
            let private_key = private_key.to_scalar()?;
            let spend =
                signer.sign_key_path(&sighasher, 0, hash_type, &private_key, &info, &aux_rand)?;
            (SpendKind::KeyPath, spend.sighash, spend.signature, None, None, spend.witness)
        }
        SpendPathRequest::ScriptPath {
            leaf_index,
            private_key,
        } => {
            let leaf = leaves.get(*leaf_index).ok_or_else(|| {
                TaprootError::InvalidTree(format!(
                    "leaf index {} out of range for {} leaves",
                    leaf_index,
                    leaves.len()
                ))
            })?;
            let private_key = private_key.to_scalar()?;
            let spend = signer.sign_script_path(
                &sighasher,
                0,
                hash_type,
                &private_key,
                &info,
                leaf,
                &aux_rand,
            )?;
            (
                SpendKind::ScriptPath,
                spend.sighash,
                spend.signature,
                Some(hex::encode(spend.leaf_hash)),
                Some(hex::encode(spend.control_block.serialize())),
                spend.witness,
            )
        }
    };

    let witness_hex = witness.to_hex_elements();
    let signed = tx.with_witnesses(vec![witness])?;

    log_info!(
        "builder",
        "Built Taproot spend",
        txid = signed.txid_hex(),
        vsize = signed.vsize(),
        fee_sats = fee
    );

    Ok(SpendReport {
        txid: signed.txid_hex(),
        tx_hex: signed.to_hex(),
        weight: signed.weight(),
        vsize: signed.vsize(),
        fee_sats: fee,
        spend_path,
        sighash_type: hash_type,
        sighash: hex::encode(sighash),
        signature: signature.to_hex(),
        leaf_hash,
        control_block,
        witness: witness_hex,
        output: derive_report(&info, &leaves)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::curve::{Curve, SecretScalar};
    use crate::crypto::taptree::TreeShape;
    use crate::tx::sighash::SighashType;
    use crate::utils::config::AuxRandPolicy;

    const INTERNAL_SECRET: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const LEAF_SECRET: &str = "2222222222222222222222222222222222222222222222222222222222222222";
    const FUNDING_TXID: &str = "5e3f0d4c2b1a09f8e7d6c5b4a3928170605f4e3d2c1b0a998877665544332211";

    fn xonly(secret: &str) -> String {
        Curve::new()
            .public_key(&SecretScalar::from_hex(secret).unwrap())
            .unwrap()
            .to_hex()
    }

    fn p2pk_script(secret: &str) -> String {
        format!("20{}ac", xonly(secret))
    }

    fn config() -> SigningConfig {
        SigningConfig {
            aux_rand: AuxRandPolicy::Zero,
            ..SigningConfig::default()
        }
    }

    fn request(spend: SpendPathRequest) -> SpendRequest {
        SpendRequest {
            output: TaprootOutputSpec {
                internal_key: xonly(INTERNAL_SECRET),
                leaves: vec![p2pk_script(LEAF_SECRET), "51".to_string(), "52".to_string()],
                tree: None,
            },
            prevout: PrevoutSpec {
                txid: FUNDING_TXID.to_string(),
                vout: 1,
                amount_sats: 100_000,
                sequence: None,
            },
            outputs: vec![OutputSpec {
                script_pubkey: format!("5120{}", "ab".repeat(32)),
                amount_sats: 99_000,
            }],
            spend,
            sighash_type: None,
            locktime: 0,
            aux_rand: None,
        }
    }

    #[test]
    fn test_derive_key_path_only() {
        let spec = TaprootOutputSpec {
            internal_key: xonly(INTERNAL_SECRET),
            leaves: Vec::new(),
            tree: None,
        };
        let report = derive(&spec, &config()).unwrap();
        assert!(report.merkle_root.is_none());
        assert!(report.leaves.is_empty());
        assert_eq!(report.script_pubkey, format!("5120{}", report.output_key));
    }

    #[test]
    fn test_derive_with_shape() {
        let spec = TaprootOutputSpec {
            internal_key: xonly(INTERNAL_SECRET),
            leaves: vec!["51".to_string(), "52".to_string(), "53".to_string()],
            tree: Some(TreeShape::branch(
                TreeShape::Leaf(0),
                TreeShape::branch(TreeShape::Leaf(1), TreeShape::Leaf(2)),
            )),
        };
        let report = derive(&spec, &config()).unwrap();
        let depths: Vec<usize> = report.leaves.iter().map(|l| l.depth).collect();
        assert_eq!(depths, vec![1, 2, 2]);
        assert_eq!(report.leaves[0].control_block.len(), 2 * 65);
        assert_eq!(report.leaves[1].control_block.len(), 2 * 97);
        assert!(report.merkle_root.is_some());
    }

    #[test]
    fn test_derive_errors() {
        let mut spec = TaprootOutputSpec {
            internal_key: "00".repeat(32),
            leaves: Vec::new(),
            tree: None,
        };
        assert!(derive(&spec, &config()).is_err());

        spec.internal_key = xonly(INTERNAL_SECRET);
        spec.tree = Some(TreeShape::Leaf(0));
        assert!(matches!(derive(&spec, &config()), Err(TaprootError::InvalidTree(_))));

        spec.tree = None;
        spec.leaves = vec!["zz".to_string()];
        assert!(matches!(derive(&spec, &config()), Err(TaprootError::ParseError(_))));
    }

    #[test]
    fn test_key_path_spend() {
        let report = build_spend(
            &request(SpendPathRequest::KeyPath {
                private_key: SecretHex::new(INTERNAL_SECRET),
            }),
            &config(),
        )
        .unwrap();

        assert_eq!(report.spend_path, SpendKind::KeyPath);
        assert_eq!(report.fee_sats, 1_000);
        assert_eq!(report.witness.len(), 1);
        assert_eq!(report.witness[0], report.signature);
        assert!(report.leaf_hash.is_none());
        assert!(report.control_block.is_none());
        assert_eq!(report.vsize, report.weight.div_ceil(4));
    }

    #[test]
    fn test_zero_aux_is_deterministic() {
        let req = request(SpendPathRequest::KeyPath {
            private_key: SecretHex::new(INTERNAL_SECRET),
        });
        let a = build_spend(&req, &config()).unwrap();
        let b = build_spend(&req, &config()).unwrap();
        assert_eq!(a.tx_hex, b.tx_hex);

        let mut fixed = req.clone();
        fixed.aux_rand = Some("01".repeat(32));
        let c = build_spend(&fixed, &config()).unwrap();
        assert_eq!(c.sighash, a.sighash);
        assert_ne!(c.signature, a.signature);
    }

    #[test]
    fn test_script_path_spend() {
        let mut req = request(SpendPathRequest::ScriptPath {
            leaf_index: 0,
            private_key: SecretHex::new(LEAF_SECRET),
        });
        req.sighash_type = Some(SighashType::All);

        let report = build_spend(&req, &config()).unwrap();
        assert_eq!(report.spend_path, SpendKind::ScriptPath);
        assert_eq!(report.sighash_type, SighashType::All);
        assert_eq!(report.witness.len(), 3);
        assert_eq!(report.witness[0], format!("{}01", report.signature));
        assert_eq!(report.witness[1], p2pk_script(LEAF_SECRET));
        assert_eq!(report.control_block.as_deref(), Some(report.witness[2].as_str()));
        assert_eq!(report.leaf_hash, Some(report.output.leaves[0].leaf_hash.clone()));
    }

    #[test]
    fn test_amount_errors() {
        let base = request(SpendPathRequest::KeyPath {
            private_key: SecretHex::new(INTERNAL_SECRET),
        });

        let mut overspend = base.clone();
        overspend.outputs[0].amount_sats = 100_001;
        assert!(matches!(build_spend(&overspend, &config()), Err(TaprootError::InvalidAmount(_))));

        let mut empty = base.clone();
        empty.outputs.clear();
        assert!(matches!(build_spend(&empty, &config()), Err(TaprootError::InvalidAmount(_))));

        let mut exact = base;
        exact.outputs[0].amount_sats = 100_000;
        assert_eq!(build_spend(&exact, &config()).unwrap().fee_sats, 0);
    }

    #[test]
    fn test_spend_errors() {
        let wrong_key = request(SpendPathRequest::KeyPath {
            private_key: SecretHex::new(LEAF_SECRET),
        });
        assert!(matches!(
            build_spend(&wrong_key, &config()),
            Err(TaprootError::InvalidPrivateKey(_))
        ));

        let bad_index = request(SpendPathRequest::ScriptPath {
            leaf_index: 3,
            private_key: SecretHex::new(LEAF_SECRET),
        });
        assert!(matches!(build_spend(&bad_index, &config()), Err(TaprootError::InvalidTree(_))));

        let wrong_leaf_key = request(SpendPathRequest::ScriptPath {
            leaf_index: 0,
            private_key: SecretHex::new(INTERNAL_SECRET),
        });
        assert!(matches!(
            build_spend(&wrong_leaf_key, &config()),
            Err(TaprootError::InvalidPrivateKey(_))
        ));

        let op_true_leaf = request(SpendPathRequest::ScriptPath {
            leaf_index: 1,
            private_key: SecretHex::new(LEAF_SECRET),
        });
        assert!(matches!(
            build_spend(&op_true_leaf, &config()),
            Err(TaprootError::MalformedScript(_))
        ));

        let mut short_aux = request(SpendPathRequest::KeyPath {
            private_key: SecretHex::new(INTERNAL_SECRET),
        });
        short_aux.aux_rand = Some("00".to_string());
        assert!(matches!(build_spend(&short_aux, &config()), Err(TaprootError::ParseError(_))));
    }
}
