use sekolah_api_models::{Post, Record, SchoolClass, SelectOption, Student, Teacher};
use sekolah_client::{Lookup, SchoolApi};

use crate::cli::{LookupArgs, LookupTarget};
use crate::client::{AppContext, CliResult};
use crate::output::render_options;

pub(crate) async fn handle_lookup(ctx: &AppContext, args: LookupArgs) -> CliResult<()> {
    let options = match args.resource {
        LookupTarget::Students => load::<Student>(&ctx.api, &args.query).await?,
        LookupTarget::Teachers => load::<Teacher>(&ctx.api, &args.query).await?,
        LookupTarget::Classes => load::<SchoolClass>(&ctx.api, &args.query).await?,
        LookupTarget::Posts => load::<Post>(&ctx.api, &args.query).await?,
    };
    render_options(&options, ctx.output)
}

async fn load<T: Record>(api: &SchoolApi, query: &str) -> CliResult<Vec<SelectOption>> {
    let loader = api.select::<T>();
    Ok(match loader.load(query).await? {
        Lookup::Loaded(options) | Lookup::Cached(options) => options,
        Lookup::Debounced | Lookup::Stale => loader.options(),
    })
}
