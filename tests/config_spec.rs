use std::collections::HashMap;

use ado_anchors::config::{FieldSpec, Settings, DEFAULT_REFRESH_MINUTES};
use speculate2::speculate;
use tempfile::TempDir;

speculate! {
    before {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("config.json");
    }

    describe "load_from" {
        it "returns defaults when the file is missing" {
            let settings = Settings::load_from(&path).expect("Failed to load");
            assert_eq!(settings, Settings::default());
            assert_eq!(settings.refresh_interval_minutes(), DEFAULT_REFRESH_MINUTES);
        }

        it "reads camelCase keys and fills the rest with defaults" {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(
                &path,
                r#"{ "organizationUrl": "https://dev.azure.com/contoso/", "projectName": "Fabrikam", "refreshIntervalMinutes": 5 }"#,
            )
            .unwrap();

            let settings = Settings::load_from(&path).expect("Failed to load");

            assert_eq!(settings.project_name.as_deref(), Some("Fabrikam"));
            assert_eq!(settings.refresh_interval_minutes(), 5);
            assert_eq!(settings.fields.rank_field, "Microsoft.VSTS.Common.StackRank");
            assert!(settings.connection().is_err());
        }

        it "fails with context on malformed files" {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "{ not json").unwrap();

            let err = Settings::load_from(&path).unwrap_err();
            assert!(err.to_string().contains("Failed to parse config file"));
        }
    }

    describe "save_to" {
        it "creates the directory and round-trips" {
            let mut settings = Settings {
                organization_url: Some("https://dev.azure.com/contoso".to_string()),
                project_name: Some("Fabrikam".to_string()),
                personal_access_token: Some("pat".to_string()),
                refresh_interval_minutes: Some(30),
                comprehensive_queries: true,
                ..Settings::default()
            };
            settings.fields.contacts.push(FieldSpec::new("Architect", "Custom.SolutionArchitect"));

            settings.save_to(&path).expect("Failed to save");
            let loaded = Settings::load_from(&path).expect("Failed to load");

            assert_eq!(loaded, settings);
        }
    }

    describe "apply_env" {
        it "overrides file values" {
            let vars: HashMap<&str, &str> = [
                ("ADO_ORGANIZATION_URL", "https://dev.azure.com/other"),
                ("ADO_PROJECT", "Other"),
                ("ADO_PAT", "token"),
                ("ADO_REFRESH_MINUTES", "60"),
            ]
            .into_iter()
            .collect();
            let mut settings = Settings {
                project_name: Some("Fabrikam".to_string()),
                ..Settings::default()
            };

            settings.apply_env(|key| vars.get(key).map(|v| v.to_string()));

            let conn = settings.connection().expect("Should be configured");
            assert_eq!(conn.organization_url, "https://dev.azure.com/other");
            assert_eq!(conn.project_name, "Other");
            assert_eq!(settings.refresh_interval_minutes(), 60);
        }

        it "ignores unparseable refresh intervals" {
            let mut settings = Settings::default();
            settings.apply_env(|key| (key == "ADO_REFRESH_MINUTES").then(|| "soon".to_string()));
            assert_eq!(settings.refresh_interval_minutes, None);
        }
    }

    describe "connection" {
        it "trims trailing slashes and builds item links" {
            let settings = Settings {
                organization_url: Some("https://dev.azure.com/contoso//".to_string()),
                project_name: Some("Team Project".to_string()),
                personal_access_token: Some("pat".to_string()),
                ..Settings::default()
            };

            let conn = settings.connection().expect("Should be configured");
            assert_eq!(
                conn.item_link(7),
                "https://dev.azure.com/contoso/Team%20Project/_workitems/edit/7"
            );
        }
    }
}
