mod support;

use std::sync::Arc;

use ado_anchors::anchor::AnchorTarget;
use ado_anchors::config::{FieldGroup, FieldSpec, Settings};
use ado_anchors::models::WorkItem;
use ado_anchors::present::{
    html_to_text, ChildrenState, DetailView, MemoryHost, Presentation, PresentationController,
    QueryView, Tab, View,
};
use ado_anchors::render::{present_binding, BindingTarget, Expansion, RenderBinding};
use serde_json::json;
use speculate2::speculate;
use support::*;

fn item(id: i64) -> WorkItem {
    serde_json::from_value(work_item(id, "Checkout", "Active")).unwrap()
}

fn query_view(name: &str) -> View {
    View::Query(QueryView {
        identifier: name.to_string(),
        rows: vec![],
    })
}

speculate! {
    describe "presentation controller" {
        before {
            let mut controller = PresentationController::new(MemoryHost::new());
        }

        it "starts closed" {
            assert!(!controller.is_open());
            assert!(controller.host().mounted().is_empty());
        }

        it "keeps one popover and one listener when a second opens" {
            let first = controller.open(query_view("First"));
            let second = controller.open(query_view("Second"));

            assert_ne!(first, second);
            assert_eq!(controller.host().mounted().len(), 1);
            assert!(controller.host().mounted()[0].starts_with("Query: Second"));
            assert_eq!(controller.host().listener_count(), 1);
            assert!(controller.host().listener_for(first).is_none());
        }

        it "closes on an outside click" {
            let mount = controller.open(query_view("First"));
            let listener = controller.host().listener_for(mount).unwrap();

            controller.handle_outside_click(listener);

            assert!(!controller.is_open());
            assert!(controller.host().mounted().is_empty());
            assert_eq!(controller.host().listener_count(), 0);
        }

        it "ignores clicks from a stale listener" {
            let first = controller.open(query_view("First"));
            let stale = controller.host().listener_for(first).unwrap();
            controller.open(query_view("Second"));

            controller.handle_outside_click(stale);

            assert!(controller.is_open());
        }
    }

    describe "modal presentation" {
        it "registers no outside-click listener" {
            let mut controller =
                PresentationController::with_presentation(MemoryHost::new(), Presentation::Modal);
            controller.open(query_view("Only"));

            assert_eq!(controller.host().listener_count(), 0);
            controller.close();
            assert!(controller.host().mounted().is_empty());
        }
    }

    describe "html_to_text" {
        it "keeps paragraphs and decodes entities" {
            assert_eq!(
                html_to_text("<p>Fish &amp; chips</p><p>a&nbsp;&lt;b&gt;<br>c</p>"),
                "Fish & chips\na <b>\nc"
            );
        }

        it "returns empty text for empty markup" {
            assert_eq!(html_to_text("<div></div>"), "");
        }
    }
}

mod detail_view {
    use super::*;

    #[tokio::test]
    async fn children_tab_fetches_once_per_view() {
        let transport = Arc::new(MockTransport::new());
        transport.route("/_apis/wit/wiql?", wiql(&[43]));
        transport.route("/_apis/wit/workitems?ids=", batch(vec![work_item(43, "Cart", "Closed")]));
        let mut view = DetailView::new(item(42), client(&transport));

        assert_eq!(view.children(), &ChildrenState::NotLoaded);
        view.select_tab(Tab::Children).await;
        view.select_tab(Tab::Description).await;
        view.select_tab(Tab::Children).await;

        assert_eq!(transport.count("/_apis/wit/wiql?"), 1);
        match view.children() {
            ChildrenState::Loaded(items) => assert_eq!(items[0].title(), "Cart"),
            other => panic!("expected loaded children, got {other:?}"),
        }

        let fresh = DetailView::new(item(42), client(&transport));
        assert_eq!(fresh.children(), &ChildrenState::NotLoaded);
    }

    #[tokio::test]
    async fn failed_children_are_retried_on_the_next_visit() {
        let transport = Arc::new(MockTransport::new());
        transport.fail("/_apis/wit/wiql?", 500);
        let mut view = DetailView::new(item(42), client(&transport));

        view.select_tab(Tab::Children).await;
        assert!(matches!(view.children(), ChildrenState::Failed(_)));

        transport.route("/_apis/wit/wiql?", wiql(&[]));
        view.select_tab(Tab::Children).await;
        assert_eq!(view.children(), &ChildrenState::Loaded(vec![]));
        assert!(View::Detail(view).render().contains("No child items found."));
    }

    #[tokio::test]
    async fn expanded_children_show_assignee_and_description() {
        let transport = Arc::new(MockTransport::new());
        transport.route("/_apis/wit/wiql?", wiql(&[43, 44]));
        transport.route(
            "/_apis/wit/workitems?ids=",
            batch(vec![work_item(43, "Cart", "Closed"), work_item(44, "Pay", "New")]),
        );
        let mut controller = PresentationController::new(MemoryHost::new());
        controller.open(View::Detail(DetailView::new(item(42), client(&transport))));

        controller.select_tab(Tab::Children).await;
        controller.toggle_child(43);

        let text = controller.host().mounted()[0].to_string();
        assert!(text.contains("├── ● #43 Cart [Closed]"));
        assert!(text.contains("│   Assigned To: Grace Hopper <grace@contoso.com>"));
        assert!(text.contains("│   Ship it"));
        assert!(text.contains("└── ◇ #44 Pay [New]"));
        assert!(!text.contains("    Assigned To"));
    }

    #[test]
    fn header_link_and_tabs_follow_settings() {
        let transport = Arc::new(MockTransport::new());
        let mut settings = settings();
        settings.fields.groups = vec![FieldGroup {
            name: "Readiness".to_string(),
            fields: vec![FieldSpec::new("Risk", "Custom.Risk")],
        }];
        let view = DetailView::new(item(42), client_with(&transport, settings));

        let labels: Vec<String> = view.tabs().into_iter().map(|(_, l)| l).collect();
        assert_eq!(labels, vec!["Description", "Contacts", "Children", "Readiness"]);
        assert_eq!(
            view.link().as_deref(),
            Some("https://dev.azure.com/contoso/Fabrikam/_workitems/edit/42")
        );
        let (name, fields) = view.group(0).unwrap();
        assert_eq!(name, "Readiness");
        assert_eq!(fields[0].1, None);

        let text = View::Detail(view).render();
        assert!(text.starts_with("#42 Checkout [Active]\n"));
        assert!(text.contains("[Description]  Contacts  Children  Readiness"));
        assert!(text.contains("Open: https://dev.azure.com/contoso/Fabrikam/_workitems/edit/42"));
    }

    #[test]
    fn link_falls_back_to_the_record_url_when_unconfigured() {
        let transport = Arc::new(MockTransport::new());
        let view = DetailView::new(item(42), client_with(&transport, Settings::default()));

        assert_eq!(
            view.link().as_deref(),
            Some("https://dev.azure.com/contoso/_apis/wit/workItems/42")
        );
    }

    #[tokio::test]
    async fn contacts_tab_lists_every_role() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = PresentationController::new(MemoryHost::new());
        controller.open(View::Detail(DetailView::new(item(42), client(&transport))));

        controller.select_tab(Tab::Contacts).await;

        let text = controller.host().mounted()[0].to_string();
        assert!(text.contains("Assigned To: Grace Hopper <grace@contoso.com>"));
        assert!(text.contains("Created By: N/A"));
        assert!(transport.calls().is_empty());
    }
}

mod fetch_then_present {
    use super::*;

    #[tokio::test]
    async fn clicking_a_second_anchor_replaces_the_popover() {
        let transport = Arc::new(MockTransport::new());
        transport.route("/_apis/wit/workitems/1", work_item(1, "One", "New"));
        transport.route("/_apis/wit/wiql/", json!({ "workItems": [] }));
        let ctx = context(&transport);
        let mut controller = PresentationController::new(MemoryHost::new());

        let item = RenderBinding::new(BindingTarget::Anchor(AnchorTarget::container(1)), ctx.clone());
        let query = RenderBinding::new(
            BindingTarget::Anchor(AnchorTarget::saved_query("Shared/Bugs").unwrap()),
            ctx,
        );

        assert!(matches!(present_binding(&item, &mut controller).await, Expansion::Loaded(_)));
        assert!(matches!(present_binding(&query, &mut controller).await, Expansion::Loaded(_)));

        assert_eq!(controller.host().mounted().len(), 1);
        assert_eq!(controller.host().listener_count(), 1);
        assert_eq!(controller.active_view().map(|v| v.title()), Some("Query: Shared/Bugs".to_string()));
    }

    #[tokio::test]
    async fn failures_do_not_open_a_view() {
        let transport = Arc::new(MockTransport::new());
        transport.fail("/_apis/wit/workitems/1", 500);
        let mut controller = PresentationController::new(MemoryHost::new());
        let binding = RenderBinding::new(
            BindingTarget::Anchor(AnchorTarget::container(1)),
            context(&transport),
        );

        let expansion = present_binding(&binding, &mut controller).await;

        assert!(matches!(expansion, Expansion::Failed(_)));
        assert!(!controller.is_open());
    }
}
