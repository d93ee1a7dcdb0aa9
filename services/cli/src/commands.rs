use decree_engine::error::AppError;
use decree_engine::rules::attributes::EntityId;
use decree_engine::rules::catalog::ScoreFilter;
use decree_engine::rules::{
    DecreeTarget, ExpressionField, RuleError, ScoreDraft, ScoreId, SimulationRequest, VariableId,
};
use tracing::info;

use crate::cli::{AddScoreArgs, ListScoresArgs, ScoreArgs, SimulateArgs};
use crate::infra::{print_json, read_json, Workspace};

pub(crate) fn simulate(workspace: &Workspace, args: SimulateArgs) -> Result<(), AppError> {
    let mut request = match (&args.request, args.date) {
        (Some(path), _) => read_json::<SimulationRequest>(path)?,
        (None, Some(date)) => SimulationRequest::new(date),
        (None, None) => {
            return Err(RuleError::validation("either --date or --request is required").into())
        }
    };
    if let Some(date) = args.date {
        request.effective_date = date;
    }
    if args.category.is_some() {
        request.category = args.category;
    }

    let person = args.person.map(EntityId);
    if let Some(person) = &person {
        let recorded = workspace.simulation.record_variable_values(
            &workspace.attributes,
            person,
            request.effective_date,
        )?;
        for (name, value) in recorded {
            request.variable_values.entry(name).or_insert(value);
        }
    }
    request.variable_values.extend(args.values);

    let result = match person {
        Some(person_id) if args.archive => {
            let target = DecreeTarget {
                person_id,
                effective_date: request.effective_date,
                hokm_type_id: args.hokm_type,
            };
            let result =
                workspace
                    .simulation
                    .simulate_and_archive(&request, &target, workspace.store())?;
            workspace.save()?;
            result
        }
        _ => workspace.simulation.simulate(&request)?,
    };
    print_json(&result)
}

pub(crate) fn add_score(workspace: &Workspace, args: AddScoreArgs) -> Result<(), AppError> {
    let draft: ScoreDraft = read_json(&args.file)?;
    let score = workspace.catalog.create_score(draft)?;
    if !args.variables.is_empty() {
        let variables: Vec<VariableId> = args.variables.into_iter().map(VariableId).collect();
        workspace.catalog.set_linked_variables(&score.id, &variables)?;
    }
    workspace.save()?;
    info!(score = %score.id.0, "draft score created");
    print_json(&score)
}

pub(crate) fn list_scores(workspace: &Workspace, args: ListScoresArgs) -> Result<(), AppError> {
    let filter = ScoreFilter {
        category: args.category,
        status: args.status.map(Into::into),
    };
    print_json(&workspace.catalog.list_scores(&filter)?)
}

pub(crate) fn publish(workspace: &Workspace, args: ScoreArgs) -> Result<(), AppError> {
    let outcome = workspace.catalog.publish(&ScoreId(args.id))?;
    if !outcome.already_active {
        workspace.save()?;
    }
    print_json(&outcome)
}

pub(crate) fn duplicate(workspace: &Workspace, args: ScoreArgs) -> Result<(), AppError> {
    let copy = workspace.catalog.duplicate(&ScoreId(args.id))?;
    workspace.save()?;
    print_json(&copy)
}

pub(crate) fn lint(workspace: &Workspace) -> Result<(), AppError> {
    let issues = workspace.catalog.check_expressions()?;
    for issue in &issues {
        let field = match issue.field {
            ExpressionField::Condition => "condition",
            ExpressionField::Formula => "formula",
        };
        println!(
            "{} ({}) {field} \"{}\": {}",
            issue.score_name, issue.score_id.0, issue.expression, issue.error
        );
    }
    if issues.is_empty() {
        println!("no expression issues");
    }
    Ok(())
}
