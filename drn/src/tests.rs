#[cfg(test)]
mod tests {
    use crate::config::{Arch, BlockKind, DrnAConfig, DrnConfig, DrnSegConfig, ModelName, OutputMode};
    use crate::error::DrnError;

    #[test]
    fn test_unknown_model_name_error() {
        match ModelName::parse("drn_b_99") {
            Err(DrnError::UnknownModel { name }) => {
                assert_eq!(name, "drn_b_99");
            }
            _ => panic!("Expected UnknownModel error"),
        }
    }

    #[test]
    fn test_model_name_round_trip() {
        assert_eq!(ModelName::parse("drn_d_22").unwrap(), ModelName::DrnD22);
        assert_eq!(ModelName::parse("drn_a_50").unwrap(), ModelName::DrnA50);
        assert_eq!(ModelName::parse("drn_e_22").unwrap(), ModelName::DrnE22);
    }

    #[test]
    fn test_mandatory_layer_group_must_be_populated() {
        let config = DrnConfig::new(Arch::D, BlockKind::Basic, [1, 0, 2, 2, 2, 2, 1, 1]);

        match config.validate() {
            Err(DrnError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("layer2"));
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
    }

    #[test]
    fn test_dense_output_requires_classes() {
        let config = DrnConfig::drn_d_22()
            .with_num_classes(None)
            .with_output(OutputMode::Dense);

        match config.validate() {
            Err(DrnError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("dense"));
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
    }

    #[test]
    fn test_zero_classes_rejected() {
        let config = DrnConfig::drn_c_26().with_num_classes(Some(0));
        assert!(config.validate().is_err());

        let config = DrnAConfig::drn_a_18().with_num_classes(Some(0));
        assert!(config.validate().is_err());

        let config = DrnSegConfig::new(ModelName::DrnD22, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(DrnConfig::drn_c_26().validate().is_ok());
        assert!(DrnConfig::drn_c_42().validate().is_ok());
        assert!(DrnConfig::drn_d_22().validate().is_ok());
        assert!(DrnConfig::drn_d_38().validate().is_ok());
        assert!(DrnConfig::drn_d_54().validate().is_ok());
        assert!(DrnConfig::drn_e_22().validate().is_ok());
        assert!(DrnAConfig::drn_a_18().validate().is_ok());
        assert!(DrnAConfig::drn_a_50().validate().is_ok());
    }

    #[test]
    fn test_headless_classification_config_is_valid() {
        let config = DrnConfig::drn_d_38().with_num_classes(None);
        assert!(config.validate().is_ok());
    }
}
