use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct LoadingSkeletonProps {
    #[prop_or(2)]
    pub count: usize,
}

/// Placeholder cards shown until the first data arrives
#[function_component(LoadingSkeleton)]
pub fn loading_skeleton(props: &LoadingSkeletonProps) -> Html {
    html! {
        <div class="grid-container" aria-busy="true">
            { for (0..props.count).map(|i| html! {
                <div key={i} class="parking-card skeleton">
                    <div class="skeleton-name skeleton-shimmer"></div>
                    <div class="skeleton-spots skeleton-shimmer"></div>
                    <div class="skeleton-age skeleton-shimmer"></div>
                    <div class="skeleton-timestamp skeleton-shimmer"></div>
                </div>
            }) }
        </div>
    }
}

#[function_component(LoadingSpinner)]
pub fn loading_spinner() -> Html {
    html! {
        <div class="loading-spinner" role="status">
            <span class="visually-hidden">{"Loading..."}</span>
        </div>
    }
}
