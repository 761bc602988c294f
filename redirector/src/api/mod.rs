pub mod localization;
