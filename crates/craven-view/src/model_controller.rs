#![forbid(unsafe_code)]

//! Controller that mirrors one model: `change` re-renders, `destroy` removes.

use std::fmt;
use std::ops::Deref;

use craven_core::Model;
use craven_core::names::{CHANGE, DESTROY};

use crate::controller::{Controller, ControllerOptions, REMOVE, RENDER};
use crate::error::Result;
use crate::host::ViewHost;

/// A [`Controller`] bound to a mandatory model.
///
/// `change` on the model calls the controller's *current* `render` method
/// and `destroy` calls its current `remove`, so either can be replaced after
/// construction. The bindings are made once; to present another model, build
/// another controller.
pub struct ModelController<H: ViewHost> {
    controller: Controller<H>,
    model: Model,
}

impl<H: ViewHost> ModelController<H> {
    /// Bind `model` with extra `options` (methods, further bindings, view
    /// configuration). Any model already set in `options` is replaced.
    pub fn new(host: &H, model: &Model, options: ControllerOptions<H>) -> Result<Self> {
        let options = Self::wire(model, options);
        options.check()?;
        Ok(Self {
            controller: Controller::build(host, options),
            model: model.clone(),
        })
    }

    /// Bind `model` with default options.
    #[must_use]
    pub fn with_model(host: &H, model: &Model) -> Self {
        Self {
            controller: Controller::build(host, Self::wire(model, ControllerOptions::new())),
            model: model.clone(),
        }
    }

    fn wire(model: &Model, options: ControllerOptions<H>) -> ControllerOptions<H> {
        options
            .model(model)
            .on_model(CHANGE, RENDER)
            .on_model(DESTROY, REMOVE)
    }

    /// The bound model.
    #[must_use]
    pub fn bound_model(&self) -> &Model {
        &self.model
    }

    /// The underlying controller handle.
    #[must_use]
    pub fn controller(&self) -> &Controller<H> {
        &self.controller
    }

    /// Unwrap into the underlying controller handle.
    #[must_use]
    pub fn into_controller(self) -> Controller<H> {
        self.controller
    }
}

impl<H: ViewHost> Deref for ModelController<H> {
    type Target = Controller<H>;

    fn deref(&self) -> &Controller<H> {
        &self.controller
    }
}

impl<H: ViewHost> From<ModelController<H>> for Controller<H> {
    fn from(controller: ModelController<H>) -> Self {
        controller.controller
    }
}

impl<H: ViewHost> Clone for ModelController<H> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            model: self.model.clone(),
        }
    }
}

impl<H: ViewHost> fmt::Debug for ModelController<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelController")
            .field(&self.controller)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Invocation;
    use crate::document::Document;
    use craven_core::{Publisher, Schema, attrs};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn todo() -> Model {
        let schema = Schema::new("Todo", ["title"]).unwrap();
        Model::with_attributes(&schema, &attrs! {"title" => "milk"})
    }

    fn title_renderer(c: &Controller<Document>, _: &Invocation<'_, Document>) {
        let title = c
            .model()
            .and_then(|m| m.get("title"))
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        c.host().set_text(*c.view(), title);
    }

    #[test]
    fn change_renders_through_current_method() {
        let doc = Document::new();
        let model = todo();
        let mc = ModelController::new(
            &doc,
            &model,
            ControllerOptions::new().tag_name("li").method(RENDER, title_renderer),
        )
        .unwrap();
        mc.render();
        assert_eq!(doc.text(*mc.view()), "milk");

        model.set("title", "eggs");
        model.save();
        assert_eq!(doc.text(*mc.view()), "eggs");

        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        mc.set_method(RENDER, move |_: &Controller<Document>, _: &Invocation<'_, Document>| {
            l.borrow_mut().push("replaced");
        });
        model.set("title", "bread");
        model.save();
        assert_eq!(*log.borrow(), ["replaced"]);
        assert_eq!(doc.text(*mc.view()), "eggs");
    }

    #[test]
    fn destroy_removes_the_view_and_bindings() {
        let doc = Document::new();
        let model = todo();
        let mc = ModelController::with_model(&doc, &model);
        doc.append_child(&doc.body(), mc.view());
        assert_eq!(model.subscriber_count(CHANGE), 1);

        model.destroy();
        assert!(mc.is_removed());
        assert_eq!(doc.parent(mc.view()), None);
        assert_eq!(model.subscriber_count(CHANGE), 0);
        assert_eq!(model.subscriber_count(DESTROY), 0);
    }

    #[test]
    fn explicit_remove_unbinds_before_detaching() {
        let doc = Document::new();
        let model = todo();
        let mc = ModelController::with_model(&doc, &model);
        doc.append_child(&doc.body(), mc.view());
        mc.remove();
        mc.remove();
        assert_eq!(model.subscriber_count(CHANGE), 0);
        assert!(doc.children(&doc.body()).is_empty());

        // A later destroy reaches nothing.
        model.destroy();
        assert!(mc.is_removed());
    }

    #[test]
    fn overridden_remove_runs_on_destroy() {
        let doc = Document::new();
        let model = todo();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let mc = ModelController::new(
            &doc,
            &model,
            ControllerOptions::new().method(
                REMOVE,
                move |c: &Controller<Document>, _: &Invocation<'_, Document>| {
                    l.borrow_mut().push("fade out");
                    c.teardown();
                },
            ),
        )
        .unwrap();
        model.destroy();
        assert_eq!(*log.borrow(), ["fade out"]);
        assert!(mc.is_removed());
    }

    #[test]
    fn the_bound_model_is_exposed() {
        let doc = Document::new();
        let model = todo();
        let mc = ModelController::with_model(&doc, &model);
        assert_eq!(mc.bound_model(), &model);
        let controller: Controller<Document> = mc.clone().into();
        assert_eq!(controller, mc.into_controller());
    }

    #[test]
    fn extra_bindings_are_checked() {
        let doc = Document::new();
        let model = todo();
        let result = ModelController::new(
            &doc,
            &model,
            ControllerOptions::new().on_dom("dblclick", "", "edit"),
        );
        assert!(result.is_err());
    }
}
